//! Solaris strategy: follow the target's `envp` through `/proc/<pid>/as`.
//!
//! `psinfo` gives the data model and the address of the environment vector.
//! The address space file is then read positionally: first the pointer slot,
//! then the string it points to.

use std::fs;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use tracing::debug;

use super::Candidate;
use super::ProcessFinder;
use super::own_pid;
use super::parse_pid;
use crate::ByteOrder;
use crate::FinderConfig;
use crate::ForeignPointerWidth;
use crate::Marker;
use crate::Pid;
use crate::PidList;
use crate::error::FinderError;

/// Upper bound on environment slots walked for one process.
const MAX_ENV_SLOTS: usize = 65536;

/// Location and pointer width of a target's environment vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvVector {
    pub envp: u64,
    pub width: ForeignPointerWidth,
    pub order: ByteOrder,
}

/// Walks the NULL-terminated pointer array at `vector.envp` inside
/// `address_space` and compares each referenced string to the marker.
///
/// Strings longer than `string_cap` (or not terminated inside it) never
/// match. Any read error aborts the walk.
pub fn env_vector_contains<A: FileExt>(
    address_space: &A,
    vector: EnvVector,
    marker: &Marker,
    string_cap: usize,
) -> io::Result<bool> {
    let word_size = vector.width.word_size();
    let mut word = [0u8; 8];
    let mut text = vec![0u8; string_cap];

    for index in 0..MAX_ENV_SLOTS {
        let slot = vector
            .width
            .slot_address(vector.envp, index)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidData))?;
        address_space.read_exact_at(&mut word[..word_size], slot)?;

        let pointer = vector
            .width
            .decode(&word[..word_size], vector.order)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidData))?;
        if pointer == 0 {
            return Ok(false);
        }

        let len = read_at_retrying(address_space, &mut text, pointer)?;
        let Some(end) = text[..len].iter().position(|&b| b == 0) else {
            continue;
        };
        if marker.matches_entry(&text[..end]) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn read_at_retrying<A: FileExt>(file: &A, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    loop {
        match file.read_at(buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PsinfoFinder {
    root: PathBuf,
    string_cap: usize,
}

impl PsinfoFinder {
    pub fn new(root: impl Into<PathBuf>, string_cap: usize) -> Self {
        Self {
            root: root.into(),
            string_cap,
        }
    }

    pub fn from_config(config: &FinderConfig) -> Self {
        Self::new(config.proc_root.clone(), config.environ_cap)
    }

    pub fn inspect(&self, pid: Pid, marker: &Marker) -> Candidate {
        let dir = self.root.join(pid.to_string());
        let vector = match read_env_vector(&dir) {
            Ok(vector) => vector,
            Err(e) => return Candidate::Skipped(e),
        };
        let address_space = match File::open(dir.join("as")) {
            Ok(file) => file,
            Err(e) => return Candidate::Skipped(e),
        };

        match env_vector_contains(&address_space, vector, marker, self.string_cap) {
            Ok(true) => Candidate::Matched,
            Ok(false) => Candidate::NotMatched,
            Err(e) => Candidate::Skipped(e),
        }
    }
}

impl ProcessFinder for PsinfoFinder {
    fn find_by_marker(&self, marker: &Marker) -> Result<PidList, FinderError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| FinderError::table_unavailable(self.root.display().to_string(), e))?;

        let own = own_pid();
        let mut pids = PidList::new();

        for entry in entries {
            let Ok(entry) = entry else {
                continue;
            };
            let Some(pid) = parse_pid(&entry.file_name()) else {
                continue;
            };
            if pid == own {
                continue;
            }

            match self.inspect(pid, marker) {
                Candidate::Matched => pids.push(pid),
                Candidate::NotMatched => {}
                Candidate::Skipped(e) => {
                    debug!(pid, error = %e, "Skipping process");
                }
            }
        }

        debug!(marker = %marker, found = pids.len(), "Scanned process table");
        Ok(pids)
    }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
fn read_env_vector(dir: &std::path::Path) -> io::Result<EnvVector> {
    use std::io::Read;

    let mut file = File::open(dir.join("psinfo"))?;
    let mut raw = [0u8; std::mem::size_of::<layout::PsinfoHead>()];
    file.read_exact(&mut raw)?;
    // SAFETY: PsinfoHead is plain old data and raw holds exactly its size
    let head: layout::PsinfoHead =
        unsafe { std::ptr::read_unaligned(raw.as_ptr() as *const layout::PsinfoHead) };

    let width = match head.pr_dmodel {
        layout::PR_MODEL_ILP32 => ForeignPointerWidth::Ilp32,
        layout::PR_MODEL_LP64 => ForeignPointerWidth::Lp64,
        _ => ForeignPointerWidth::native(),
    };
    Ok(EnvVector {
        envp: head.pr_envp as u64,
        width,
        order: ByteOrder::native(),
    })
}

#[cfg(not(any(target_os = "solaris", target_os = "illumos")))]
fn read_env_vector(_dir: &std::path::Path) -> io::Result<EnvVector> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Leading part of `psinfo_t` from `<sys/procfs.h>`, up to `pr_dmodel`.
/// Field sizes follow the reader's own data model, as the kernel presents
/// the file in the reader's model.
#[cfg(any(target_os = "solaris", target_os = "illumos"))]
mod layout {
    pub const PR_MODEL_ILP32: libc::c_char = 1;
    pub const PR_MODEL_LP64: libc::c_char = 2;

    const PRFNSZ: usize = 16;
    const PRARGSZ: usize = 80;

    #[repr(C)]
    #[derive(Clone, Copy)]
    #[allow(dead_code)]
    pub struct PsinfoHead {
        pub pr_flag: libc::c_int,
        pub pr_nlwp: libc::c_int,
        pub pr_pid: libc::pid_t,
        pub pr_ppid: libc::pid_t,
        pub pr_pgid: libc::pid_t,
        pub pr_sid: libc::pid_t,
        pub pr_uid: libc::uid_t,
        pub pr_euid: libc::uid_t,
        pub pr_gid: libc::gid_t,
        pub pr_egid: libc::gid_t,
        pub pr_addr: libc::uintptr_t,
        pub pr_size: libc::size_t,
        pub pr_rssize: libc::size_t,
        pub pr_pad1: libc::size_t,
        pub pr_ttydev: libc::dev_t,
        pub pr_pctcpu: libc::c_ushort,
        pub pr_pctmem: libc::c_ushort,
        pub pr_start: libc::timespec,
        pub pr_time: libc::timespec,
        pub pr_ctime: libc::timespec,
        pub pr_fname: [libc::c_char; PRFNSZ],
        pub pr_psargs: [libc::c_char; PRARGSZ],
        pub pr_wstat: libc::c_int,
        pub pr_argc: libc::c_int,
        pub pr_argv: libc::uintptr_t,
        pub pr_envp: libc::uintptr_t,
        pub pr_dmodel: libc::c_char,
    }
}
