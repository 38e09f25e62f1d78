//! Errors for process table scans and the environment store.
//!
//! Both enums carry semantic codes, categories and suggestions so the
//! binaries can report them uniformly and pick a sysexits exit code.

use std::io;
use std::path::PathBuf;

use nativeexec_common::error_codes::{self, ErrorCategory};
use serde_json::{Value, json};
use thiserror::Error;

/// Process table errors.
///
/// Failures for a single candidate process are never surfaced; only a table
/// that cannot be enumerated at all is an error.
#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Process table unavailable ({table}): {source}")]
    TableUnavailable {
        table: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid marker: {0}")]
    InvalidMarker(String),
}

impl FinderError {
    pub fn table_unavailable(table: impl Into<String>, source: io::Error) -> Self {
        FinderError::TableUnavailable {
            table: table.into(),
            source,
        }
    }

    /// Returns the semantic error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            FinderError::TableUnavailable { .. } => error_codes::TABLE_UNAVAILABLE,
            FinderError::InvalidMarker(_) => error_codes::INVALID_MARKER,
        }
    }

    /// Returns the error category for programmatic handling.
    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    /// Returns structured context about the error for debugging.
    pub fn context(&self) -> Value {
        match self {
            FinderError::TableUnavailable { table, source } => json!({
                "table": table,
                "reason": source.to_string()
            }),
            FinderError::InvalidMarker(reason) => json!({ "reason": reason }),
        }
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            FinderError::TableUnavailable { source, .. }
                if source.kind() == io::ErrorKind::PermissionDenied =>
            {
                "The process table is not readable by this user. Check procfs mount options (hidepid)."
                    .to_string()
            }
            FinderError::TableUnavailable { .. } => {
                "Could not enumerate processes. Check that /proc is mounted or that ps is installed."
                    .to_string()
            }
            FinderError::InvalidMarker(_) => {
                "Markers must be non-empty and must not contain NUL bytes.".to_string()
            }
        }
    }

    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Environment store errors.
#[derive(Error, Debug)]
pub enum EnvStoreError {
    #[error("Environment file {} is locked by another process", .path.display())]
    Locked { path: PathBuf },
    #[error("Environment file {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("Failed to {operation} environment file {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EnvStoreError {
    pub(crate) fn io(operation: &'static str, path: &std::path::Path, source: io::Error) -> Self {
        EnvStoreError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &std::path::Path, reason: impl Into<String>) -> Self {
        EnvStoreError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Returns the semantic error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            EnvStoreError::Locked { .. } => error_codes::ENV_LOCKED,
            EnvStoreError::Corrupt { .. } => error_codes::ENV_CORRUPT,
            EnvStoreError::Io { .. } => error_codes::ENV_IO,
        }
    }

    /// Returns the error category for programmatic handling.
    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    /// Returns structured context about the error for debugging.
    pub fn context(&self) -> Value {
        match self {
            EnvStoreError::Locked { path } => json!({ "path": path.display().to_string() }),
            EnvStoreError::Corrupt { path, reason } => json!({
                "path": path.display().to_string(),
                "reason": reason
            }),
            EnvStoreError::Io {
                operation,
                path,
                source,
            } => json!({
                "operation": operation,
                "path": path.display().to_string(),
                "reason": source.to_string()
            }),
        }
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            EnvStoreError::Locked { .. } => {
                "Another process is reading or writing this file. Retry once it has finished."
                    .to_string()
            }
            EnvStoreError::Corrupt { .. } => {
                "The dump is truncated or was not written by env_store::dump. Dump the environment again."
                    .to_string()
            }
            EnvStoreError::Io { .. } => {
                "Check that the path exists and is accessible.".to_string()
            }
        }
    }

    /// Lock contention is the only outcome worth polling on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnvStoreError::Locked { .. })
    }
}

impl FinderError {
    /// Returns structured JSON representation of this error.
    pub fn to_json(&self) -> Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
            "category": self.category().as_str(),
            "retryable": self.is_retryable(),
            "context": self.context(),
            "suggestion": self.suggestion()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_unavailable_category() {
        let err = FinderError::table_unavailable("/proc", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code(), error_codes::TABLE_UNAVAILABLE);
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.context()["table"], "/proc");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_table_unavailable_json() {
        let err = FinderError::table_unavailable("/proc", io::Error::from(io::ErrorKind::NotFound));
        let value = err.to_json();
        assert_eq!(value["code"], error_codes::TABLE_UNAVAILABLE);
        assert_eq!(value["category"], "not_found");
        assert_eq!(value["retryable"], false);
        assert_eq!(value["context"]["table"], "/proc");
        assert!(value["message"].as_str().unwrap().contains("/proc"));
    }

    #[test]
    fn test_table_unavailable_permission_suggestion() {
        let err = FinderError::table_unavailable(
            "/proc",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.suggestion().contains("hidepid"));
    }

    #[test]
    fn test_locked_is_busy_and_retryable() {
        let err = EnvStoreError::Locked {
            path: PathBuf::from("/tmp/env.dump"),
        };
        assert_eq!(err.category(), ErrorCategory::Busy);
        assert!(err.is_retryable());
        assert_eq!(err.category().as_str(), "busy");
    }

    #[test]
    fn test_corrupt_context() {
        let err = EnvStoreError::corrupt(std::path::Path::new("/tmp/x"), "count mismatch");
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.context()["reason"], "count mismatch");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_error_message() {
        let err = EnvStoreError::io(
            "open",
            std::path::Path::new("/nonexistent"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.to_string().contains("Failed to open"));
        assert_eq!(err.context()["operation"], "open");
    }
}
