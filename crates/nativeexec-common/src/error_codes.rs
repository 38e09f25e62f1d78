//! Semantic error codes and exit statuses.
//!
//! Domain codes are negative integers grouped by component so that a JSON
//! error report stays stable across tools:
//! - -100 to -199: process table scanning
//! - -200 to -299: environment store
//! - -300 to -399: launcher and relay

// Process table errors
pub const TABLE_UNAVAILABLE: i32 = -101;
pub const INVALID_MARKER: i32 = -102;

// Environment store errors
pub const ENV_LOCKED: i32 = -201;
pub const ENV_CORRUPT: i32 = -202;
pub const ENV_IO: i32 = -203;

// Launcher errors
pub const INVALID_ARGUMENT: i32 = -301;
pub const LAUNCH_FAILED: i32 = -302;
pub const WAIT_FAILED: i32 = -303;
pub const RELAY_FAILED: i32 = -304;
pub const RELAY_TIMEOUT: i32 = -305;

/// Successful termination.
pub const EX_OK: i32 = 0;
/// Generic failure, used when a child did not exit normally.
pub const EX_FAILURE: i32 = 1;
/// Command line usage error.
pub const EX_USAGE: i32 = 64;
/// Service unavailable (process table could not be read).
pub const EX_UNAVAILABLE: i32 = 69;
/// Operating system error during launcher setup.
pub const EX_OSERR: i32 = 71;
/// Resource busy (advisory lock held elsewhere).
pub const EX_CANTCREAT: i32 = 73;
/// Input/output error.
pub const EX_IOERR: i32 = 74;
/// Temporary failure, retry may succeed.
pub const EX_TEMPFAIL: i32 = 75;
/// The target command could not be executed.
pub const EX_EXEC_FAILED: i32 = 127;

/// Error category for programmatic handling by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource not found or not readable (process table)
    NotFound,
    /// Invalid input parameters
    InvalidInput,
    /// Resource busy or locked
    Busy,
    /// Internal invariant violated (corrupt data)
    Internal,
    /// External dependency failure (pty, process, filesystem)
    External,
    /// Operation timed out
    Timeout,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Busy => "busy",
            ErrorCategory::Internal => "internal",
            ErrorCategory::External => "external",
            ErrorCategory::Timeout => "timeout",
        }
    }

    /// Converts to a sysexits.h-compliant exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::InvalidInput => EX_USAGE,
            ErrorCategory::NotFound => EX_UNAVAILABLE,
            ErrorCategory::Busy => EX_CANTCREAT,
            ErrorCategory::External => EX_IOERR,
            ErrorCategory::Internal => EX_IOERR,
            ErrorCategory::Timeout => EX_TEMPFAIL,
        }
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(ErrorCategory::NotFound),
            "invalid_input" => Ok(ErrorCategory::InvalidInput),
            "busy" => Ok(ErrorCategory::Busy),
            "internal" => Ok(ErrorCategory::Internal),
            "external" => Ok(ErrorCategory::External),
            "timeout" => Ok(ErrorCategory::Timeout),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a domain error code to its category.
pub fn category_for_code(code: i32) -> ErrorCategory {
    match code {
        TABLE_UNAVAILABLE => ErrorCategory::NotFound,
        INVALID_MARKER | INVALID_ARGUMENT => ErrorCategory::InvalidInput,
        ENV_LOCKED => ErrorCategory::Busy,
        ENV_CORRUPT => ErrorCategory::Internal,
        RELAY_TIMEOUT => ErrorCategory::Timeout,
        ENV_IO | LAUNCH_FAILED | WAIT_FAILED | RELAY_FAILED => ErrorCategory::External,
        _ => ErrorCategory::Internal,
    }
}
