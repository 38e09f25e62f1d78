//! Uniform reporting of library errors on the tools' stderr.

use std::fmt::Display;
use std::io::Write;

use nativeexec_core::EnvStoreError;
use nativeexec_core::FinderError;
use nativeexec_pty::LaunchError;
use serde_json::Value;
use tracing::debug;

/// An error a tool can explain to the user before exiting.
pub trait Diagnostic: Display {
    fn context(&self) -> Value;
    fn suggestion(&self) -> String;
    fn is_retryable(&self) -> bool;
    fn exit_code(&self) -> i32;
}

impl Diagnostic for FinderError {
    fn context(&self) -> Value {
        FinderError::context(self)
    }

    fn suggestion(&self) -> String {
        FinderError::suggestion(self)
    }

    fn is_retryable(&self) -> bool {
        FinderError::is_retryable(self)
    }

    fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }
}

impl Diagnostic for EnvStoreError {
    fn context(&self) -> Value {
        EnvStoreError::context(self)
    }

    fn suggestion(&self) -> String {
        EnvStoreError::suggestion(self)
    }

    fn is_retryable(&self) -> bool {
        EnvStoreError::is_retryable(self)
    }

    fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }
}

impl Diagnostic for LaunchError {
    fn context(&self) -> Value {
        LaunchError::context(self)
    }

    fn suggestion(&self) -> String {
        LaunchError::suggestion(self)
    }

    fn is_retryable(&self) -> bool {
        LaunchError::is_retryable(self)
    }

    fn exit_code(&self) -> i32 {
        LaunchError::exit_code(self)
    }
}

/// Writes the error and its suggestion to `out`, returning the exit code.
pub fn write_report<E: Diagnostic + ?Sized>(out: &mut dyn Write, err: &E) -> i32 {
    debug!(context = %err.context(), "Reporting error");
    let _ = writeln!(out, "Error: {}", err);
    let _ = writeln!(out, "Suggestion: {}", err.suggestion());
    if err.is_retryable() {
        let _ = writeln!(out, "(This error may be transient - retry may succeed)");
    }
    err.exit_code()
}

/// [`write_report`] on stderr.
pub fn report<E: Diagnostic + ?Sized>(err: &E) -> i32 {
    write_report(&mut std::io::stderr().lock(), err)
}
