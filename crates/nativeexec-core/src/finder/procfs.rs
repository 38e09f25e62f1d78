//! Linux strategy: read `/proc/<pid>/environ` directly.

use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use tracing::debug;

use super::Candidate;
use super::ProcessFinder;
use super::own_pid;
use super::parse_pid;
use crate::FinderConfig;
use crate::Marker;
use crate::Pid;
use crate::PidList;
use crate::error::FinderError;

#[derive(Debug, Clone)]
pub struct ProcEnvironFinder {
    root: PathBuf,
    environ_cap: usize,
}

impl ProcEnvironFinder {
    pub fn new(root: impl Into<PathBuf>, environ_cap: usize) -> Self {
        Self {
            root: root.into(),
            environ_cap,
        }
    }

    pub fn from_config(config: &FinderConfig) -> Self {
        Self::new(config.proc_root.clone(), config.environ_cap)
    }

    /// Reads at most `environ_cap` bytes of the candidate's environment and
    /// looks for the marker among the complete entries.
    pub fn inspect(&self, pid: Pid, marker: &Marker) -> Candidate {
        let path = self.root.join(pid.to_string()).join("environ");
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => return Candidate::Skipped(e),
        };

        let mut block = Vec::with_capacity(self.environ_cap.min(64 * 1024));
        // read_to_end retries EINTR and keeps reading across short reads.
        if let Err(e) = file.take(self.environ_cap as u64).read_to_end(&mut block) {
            return Candidate::Skipped(e);
        }

        if marker.matches_environ_block(&block) {
            Candidate::Matched
        } else {
            Candidate::NotMatched
        }
    }
}

impl ProcessFinder for ProcEnvironFinder {
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
