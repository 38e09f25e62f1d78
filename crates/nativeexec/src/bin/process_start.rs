use clap::Parser;

use nativeexec::commands::ProcessStartArgs;
use nativeexec::handlers;
use nativeexec::telemetry;

fn main() {
    let args = ProcessStartArgs::parse();
    let code = {
        let _telemetry = telemetry::init_tracing("process_start");
        handlers::process_start(&args)
    };
    std::process::exit(code);
}
