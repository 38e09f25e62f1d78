use clap::Parser;

use nativeexec::commands::PrivpArgs;
use nativeexec::handlers;
use nativeexec::telemetry;

fn main() {
    let args = PrivpArgs::parse();
    let code = {
        let _telemetry = telemetry::init_tracing("privp");
        handlers::privp(&args)
    };
    std::process::exit(code);
}
