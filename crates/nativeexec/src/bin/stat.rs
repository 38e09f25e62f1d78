use clap::Parser;

use nativeexec::commands::StatArgs;
use nativeexec::handlers;
use nativeexec::telemetry;

fn main() {
    let args = StatArgs::parse();
    let code = {
        let _telemetry = telemetry::init_tracing("stat");
        handlers::stat(&args)
    };
    std::process::exit(code);
}
