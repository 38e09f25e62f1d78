//! Launcher errors with structured context.
//!
//! Setup failures inside the forked child never come back as values; they are
//! reported on the child's stdout and through its exit status. These errors
//! cover everything that happens in the calling process.

use nativeexec_common::error_codes::{self, ErrorCategory};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Failed to open PTY: {0}")]
    Open(String),
    #[error("Failed to fork: {0}")]
    Fork(String),
    #[error("Failed to wait for child: {0}")]
    Wait(String),
    #[error("Failed to send break: {0}")]
    Break(String),
    #[error("Signal forwarding setup failed: {0}")]
    SignalSetup(String),
    #[error("Password relay failed: {0}")]
    Relay(String),
    #[error("Timed out waiting for password prompt after {0} ms")]
    RelayTimeout(u64),
}

impl LaunchError {
    /// Returns the semantic error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            LaunchError::InvalidArgument(_) => error_codes::INVALID_ARGUMENT,
            LaunchError::Open(_)
            | LaunchError::Fork(_)
            | LaunchError::Break(_)
            | LaunchError::SignalSetup(_) => error_codes::LAUNCH_FAILED,
            LaunchError::Wait(_) => error_codes::WAIT_FAILED,
            LaunchError::Relay(_) => error_codes::RELAY_FAILED,
            LaunchError::RelayTimeout(_) => error_codes::RELAY_TIMEOUT,
        }
    }

    /// Returns the error category for programmatic handling.
    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    /// Returns structured context about the error for debugging.
    pub fn context(&self) -> Value {
        match self {
            LaunchError::RelayTimeout(ms) => json!({
                "operation": self.operation(),
                "timeout_ms": ms
            }),
            _ => json!({
                "operation": self.operation(),
                "reason": self.reason()
            }),
        }
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            LaunchError::InvalidArgument(_) => {
                "Arguments and environment entries must not contain NUL bytes.".to_string()
            }
            LaunchError::Open(_) => {
                "PTY allocation failed. Check system resource limits (ulimit -n) or /dev/ptmx permissions."
                    .to_string()
            }
            LaunchError::Fork(_) => {
                "Process creation failed. Check the process limit (ulimit -u).".to_string()
            }
            LaunchError::Wait(_) => {
                "The child could not be reaped. It may have been reaped by another handler."
                    .to_string()
            }
            LaunchError::Break(_) => {
                "The terminal may already be closed; the child's exit status is unaffected."
                    .to_string()
            }
            LaunchError::SignalSetup(_) => {
                "Signal handlers could not be installed. Retry the launch.".to_string()
            }
            LaunchError::Relay(reason) => {
                if reason.contains("Permission denied") {
                    "Permission denied. Check file permissions.".to_string()
                } else {
                    "The privileged command did not complete. Check the user name and password."
                        .to_string()
                }
            }
            LaunchError::RelayTimeout(_) => {
                "No password prompt appeared. Check that su is installed and asks for a password."
                    .to_string()
            }
        }
    }

    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LaunchError::Fork(_) | LaunchError::SignalSetup(_) | LaunchError::RelayTimeout(_)
        )
    }

    /// Returns the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            LaunchError::InvalidArgument(_) => "prepare",
            LaunchError::Open(_) => "open",
            LaunchError::Fork(_) => "fork",
            LaunchError::Wait(_) => "wait",
            LaunchError::Break(_) => "break",
            LaunchError::SignalSetup(_) => "signal_setup",
            LaunchError::Relay(_) | LaunchError::RelayTimeout(_) => "relay",
        }
    }

    /// Returns the underlying reason/message for the error.
    pub fn reason(&self) -> String {
        match self {
            LaunchError::InvalidArgument(r)
            | LaunchError::Open(r)
            | LaunchError::Fork(r)
            | LaunchError::Wait(r)
            | LaunchError::Break(r)
            | LaunchError::SignalSetup(r)
            | LaunchError::Relay(r) => r.clone(),
            LaunchError::RelayTimeout(ms) => format!("no prompt within {} ms", ms),
        }
    }

    /// Converts to a sysexits.h-compliant exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Fork(_) | LaunchError::Open(_) => error_codes::EX_OSERR,
            _ => self.category().exit_code(),
        }
    }
}
