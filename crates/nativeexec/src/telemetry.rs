//! Log setup shared by the five tools.
//!
//! process_start hands its stdout to the child for the pid line and exec
//! diagnostics, and pfind prints results there, so log output never goes to
//! stdout. It goes to stderr, or appends to the file named by
//! `NATIVEEXEC_LOG`. `RUST_LOG` overrides the default `warn` filter.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use tracing::span::EnteredSpan;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_FILE_ENV: &str = "NATIVEEXEC_LOG";
const DEFAULT_LEVEL: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogDestination {
    Stderr,
    File(PathBuf),
}

impl LogDestination {
    /// An unset or empty `NATIVEEXEC_LOG` means stderr.
    fn from_setting(value: Option<OsString>) -> Self {
        match value {
            Some(path) if !path.is_empty() => LogDestination::File(PathBuf::from(path)),
            _ => LogDestination::Stderr,
        }
    }
}

/// Keeps the tool's span entered and the file writer flushing until dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    _span: Option<EnteredSpan>,
    _writer: Option<WorkerGuard>,
}

/// Installs the global subscriber for `tool`. Every event is recorded inside
/// a span named after the tool, so lines from several tools sharing one log
/// file can be told apart.
pub fn init_tracing(tool: &'static str) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let (writer, file_guard, ansi) =
        match LogDestination::from_setting(std::env::var_os(LOG_FILE_ENV)) {
            LogDestination::File(path) => match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(file) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(file);
                    (BoxMakeWriter::new(non_blocking), Some(guard), false)
                }
                Err(err) => {
                    eprintln!("{}: cannot open log file {}: {}", tool, path.display(), err);
                    stderr_writer()
                }
            },
            LogDestination::Stderr => stderr_writer(),
        };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init()
        .is_ok();
    if !installed {
        return TelemetryGuard {
            _span: None,
            _writer: None,
        };
    }

    TelemetryGuard {
        _span: Some(tracing::info_span!("tool", name = tool).entered()),
        _writer: file_guard,
    }
}

fn stderr_writer() -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
    (
        BoxMakeWriter::new(std::io::stderr),
        None,
        std::io::stderr().is_terminal(),
    )
}
