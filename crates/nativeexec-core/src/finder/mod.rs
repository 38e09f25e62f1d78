//! Locating processes by an environment marker.
//!
//! Each platform gets its own strategy; the one matching the build target is
//! exported as [`NativeFinder`]. Strategies differ only in how they enumerate
//! candidates and read their environment, the outer contract is shared:
//! the table itself failing is an error, a single candidate failing is not.

mod procfs;
mod ps;
mod psinfo;

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

pub use procfs::ProcEnvironFinder;
pub use ps::PsOutputFinder;
pub use ps::parse_ps_line;
pub use psinfo::EnvVector;
pub use psinfo::PsinfoFinder;
pub use psinfo::env_vector_contains;

use crate::FinderConfig;
use crate::Marker;
use crate::Pid;
use crate::PidList;
use crate::error::FinderError;

/// Outcome of inspecting one process.
#[derive(Debug)]
pub enum Candidate {
    Matched,
    NotMatched,
    /// The process vanished or denied access while being inspected.
    Skipped(std::io::Error),
}

pub trait ProcessFinder {
    /// Returns every pid whose environment holds `marker`, excluding the
    /// calling process. Result order follows the table's enumeration order.
    fn find_by_marker(&self, marker: &Marker) -> Result<PidList, FinderError>;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub type NativeFinder = ProcEnvironFinder;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub type NativeFinder = PsinfoFinder;

#[cfg(target_os = "macos")]
pub type NativeFinder = PsOutputFinder;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "solaris",
    target_os = "illumos",
    target_os = "macos"
)))]
pub type NativeFinder = UnsupportedFinder;

pub fn native_finder(config: &FinderConfig) -> NativeFinder {
    NativeFinder::from_config(config)
}

/// Scans the native process table with the configuration taken from the
/// environment.
pub fn find_by_marker(marker: &Marker) -> Result<PidList, FinderError> {
    native_finder(&FinderConfig::from_env()).find_by_marker(marker)
}

/// Finder for targets without a known process table layout.
#[derive(Debug, Default)]
pub struct UnsupportedFinder;

impl UnsupportedFinder {
    pub fn from_config(_config: &FinderConfig) -> Self {
        UnsupportedFinder
    }
}

impl ProcessFinder for UnsupportedFinder {
    fn find_by_marker(&self, _marker: &Marker) -> Result<PidList, FinderError> {
        Err(FinderError::table_unavailable(
            std::env::consts::OS,
            std::io::Error::from(std::io::ErrorKind::Unsupported),
        ))
    }
}

/// Parses a process table entry name, accepting only all-digit names.
pub(crate) fn parse_pid(name: &OsStr) -> Option<Pid> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes)
        .ok()?
        .parse::<Pid>()
        .ok()
        .filter(|pid| *pid > 0)
}

pub(crate) fn own_pid() -> Pid {
    // SAFETY: getpid has no preconditions
    unsafe { libc::getpid() }
}
