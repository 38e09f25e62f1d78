//! Common types shared across nativeexec crates.
//!
//! Provides error categories and the sysexits-style exit codes every tool
//! reports through.

#![deny(clippy::all)]

pub mod error_codes;

pub use error_codes::ErrorCategory;
