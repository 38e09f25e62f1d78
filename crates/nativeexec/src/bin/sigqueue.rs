use clap::Parser;

use nativeexec::commands::SigqueueArgs;
use nativeexec::handlers;
use nativeexec::telemetry;

fn main() {
    let args = SigqueueArgs::parse();
    let code = {
        let _telemetry = telemetry::init_tracing("sigqueue");
        handlers::sigqueue(&args)
    };
    std::process::exit(code);
}
