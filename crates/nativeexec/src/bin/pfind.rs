use clap::Parser;

use nativeexec::commands::PfindArgs;
use nativeexec::handlers;
use nativeexec::telemetry;

fn main() {
    let args = PfindArgs::parse();
    let code = {
        let _telemetry = telemetry::init_tracing("pfind");
        handlers::pfind(&args)
    };
    std::process::exit(code);
}
