//! macOS strategy: parse `ps -AEww`, which appends each process's
//! environment to its command line.
//!
//! The environment is flattened into space-separated text, so the marker is
//! matched as a space-delimited token rather than as a whole entry.

use std::ffi::OsString;
use std::io::BufRead;
use std::io::BufReader;
use std::process::Command;
use std::process::Stdio;

use tracing::debug;
use tracing::warn;

use super::ProcessFinder;
use super::own_pid;
use crate::FinderConfig;
use crate::Marker;
use crate::Pid;
use crate::PidList;
use crate::error::FinderError;

const PS_ARGS: &[&str] = &["-AEww"];

#[derive(Debug, Clone)]
pub struct PsOutputFinder {
    program: OsString,
}

impl PsOutputFinder {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &FinderConfig) -> Self {
        Self::new(config.ps_program.clone())
    }
}

/// Splits a `ps` line into its leading pid and the remaining text.
///
/// Returns `None` for the header line and anything else that does not start
/// with a pid.
pub fn parse_ps_line(line: &[u8]) -> Option<(Pid, &[u8])> {
    let start = line.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &line[start..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let pid = std::str::from_utf8(&rest[..digits]).ok()?.parse::<Pid>().ok()?;
    Some((pid, &rest[digits..]))
}

impl ProcessFinder for PsOutputFinder {
    fn find_by_marker(&self, marker: &Marker) -> Result<PidList, FinderError> {
        let table = self.program.to_string_lossy().into_owned();
        let mut child = Command::new(&self.program)
            .args(PS_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FinderError::table_unavailable(table.clone(), e))?;

        let own = own_pid();
        let mut pids = PidList::new();

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).split(b'\n') {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Reading ps output failed");
                        break;
                    }
                };
                let Some((pid, text)) = parse_ps_line(&line) else {
                    continue;
                };
                if pid == own {
                    continue;
                }
                if marker.matches_ps_text(text) {
                    pids.push(pid);
                }
            }
        }

        match child.wait() {
            Ok(status) if !status.success() => {
                debug!(%status, "ps exited unsuccessfully");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Waiting for ps failed"),
        }

        debug!(marker = %marker, found = pids.len(), "Scanned process table");
        Ok(pids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_line() {
        let (pid, rest) = parse_ps_line(b"  4242 ??         0:00.02 /bin/sleep 30 TAG=1").unwrap();
        assert_eq!(pid, 4242);
        assert!(rest.ends_with(b"TAG=1"));
    }

    #[test]
    fn test_parse_ps_header_is_skipped() {
        assert!(parse_ps_line(b"  PID TTY           TIME CMD").is_none());
        assert!(parse_ps_line(b"").is_none());
        assert!(parse_ps_line(b"   ").is_none());
    }

    #[test]
    fn test_missing_ps_program_is_table_unavailable() {
        let finder = PsOutputFinder::new("/nonexistent/ps-binary");
        let marker = Marker::new(b"TAG=1".to_vec()).unwrap();
        let err = finder.find_by_marker(&marker).unwrap_err();
        assert!(matches!(err, FinderError::TableUnavailable { .. }));
    }

    #[test]
    fn test_scans_output_of_fake_ps() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("ps");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '  PID TTY  TIME CMD'\n\
             echo '  101 ??   0:00 /bin/a HOME=/ TAG=abc'\n\
             echo '  102 ??   0:00 /bin/b TAG=abcd PATH=/bin'\n\
             echo '  103 ??   0:00 /bin/c TAG=abc PATH=/bin'\n\
             echo '  104 ??   0:00 /bin/d FOOTAG=abc'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let finder = PsOutputFinder::new(script.as_os_str());
        let marker = Marker::new(b"TAG=abc".to_vec()).unwrap();
        let found = finder.find_by_marker(&marker).unwrap();
        assert_eq!(found.pids(), &[101, 103]);
    }
}
