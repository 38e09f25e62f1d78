//! Answering a password prompt on behalf of a caller without a terminal.
//!
//! The command runs on a fresh pty through [`crate::launch`]. Output is read
//! until the prompt shows up, the password is written back, and everything
//! after the prompt is copied to the caller's writer.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::warn;

use crate::error::LaunchError;
use crate::launcher::ChildExit;
use crate::launcher::LaunchRequest;
use crate::launcher::LaunchedChild;
use crate::launcher::launch;
use crate::pty_pair::PtyPair;

/// Matches both "Password:" and "password:".
const PROMPT: &[u8] = b"assword";
const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_SLICE_MS: i32 = 100;
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
pub struct PasswordRelay {
    prompt_timeout: Duration,
}

impl Default for PasswordRelay {
    fn default() -> Self {
        Self::new()
    }
}

enum PromptOutcome {
    /// Prompt seen; holds output that followed it in the same read.
    Seen(Vec<u8>),
    /// The command finished without asking.
    Finished(Option<ChildExit>),
}

impl PasswordRelay {
    pub fn new() -> Self {
        Self {
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }

    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Runs `request` on a new pty, answers its prompt with `password` and
    /// copies the remaining output to `output`.
    ///
    /// The request's pty path is replaced and pid reporting is turned off.
    pub fn run<W: Write>(
        &self,
        request: LaunchRequest,
        password: &[u8],
        output: &mut W,
    ) -> Result<ChildExit, LaunchError> {
        let pair = PtyPair::open()?;
        // Held until the prompt shows so the master does not see a hangup
        // before the child has opened its side.
        let slave = open_slave(&pair)?;

        let mut request = request.report_pid(false);
        request.set_pty_path(pair.slave_path());
        let child = launch(&request)?;

        match self.await_prompt(&pair, &child)? {
            PromptOutcome::Finished(Some(exit)) => {
                drop(slave);
                drain(&pair, output)?;
                Ok(exit)
            }
            PromptOutcome::Finished(None) => {
                drop(slave);
                drain(&pair, output)?;
                child.wait()
            }
            PromptOutcome::Seen(rest) => {
                debug!(pid = child.pid(), "Password prompt seen");
                let mut answer = password.to_vec();
                answer.push(b'\n');
                pair.write_all(&answer)?;
                drop(slave);

                output
                    .write_all(&rest)
                    .map_err(|e| LaunchError::Relay(e.to_string()))?;
                drain(&pair, output)?;
                child.wait()
            }
        }
    }

    fn await_prompt(
        &self,
        pair: &PtyPair,
        child: &LaunchedChild,
    ) -> Result<PromptOutcome, LaunchError> {
        let deadline = Instant::now() + self.prompt_timeout;
        let mut seen = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            if let Some(end) = find(&seen, PROMPT) {
                return Ok(PromptOutcome::Seen(seen.split_off(end)));
            }
            if Instant::now() >= deadline {
                let timeout_ms = self.prompt_timeout.as_millis() as u64;
                warn!(pid = child.pid(), timeout_ms, "No password prompt, killing child");
                let _ = child.signal(libc::SIGKILL);
                let _ = child.wait();
                return Err(LaunchError::RelayTimeout(timeout_ms));
            }

            match pair.read_timeout(&mut buf, POLL_SLICE_MS)? {
                Some(0) => return Ok(PromptOutcome::Finished(None)),
                Some(n) => seen.extend_from_slice(&buf[..n]),
                None => {
                    if let Some(exit) = child.try_wait()? {
                        return Ok(PromptOutcome::Finished(Some(exit)));
                    }
                }
            }
        }
    }
}

fn open_slave(pair: &PtyPair) -> Result<File, LaunchError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_CLOEXEC)
        .open(pair.slave_path())
        .map_err(|e| LaunchError::Open(format!("{}: {}", pair.slave_path().display(), e)))
}

fn drain<W: Write>(pair: &PtyPair, output: &mut W) -> Result<(), LaunchError> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match pair.read_timeout(&mut buf, -1)? {
            Some(0) | None => break,
            Some(n) => output
                .write_all(&buf[..n])
                .map_err(|e| LaunchError::Relay(e.to_string()))?,
        }
    }
    output.flush().map_err(|e| LaunchError::Relay(e.to_string()))
}

/// Index just past the first occurrence of `needle`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + needle.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_prompt() {
        assert_eq!(find(b"Password: ", b"assword"), Some(8));
        assert_eq!(find(b"password:", b"assword"), Some(8));
        assert_eq!(find(b"Login: ", b"assword"), None);
        assert_eq!(find(b"", b"assword"), None);
    }

    #[test]
    fn test_answers_prompt_and_relays_output() {
        let request = LaunchRequest::new("/dev/null", "/bin/sh").args([
            "-c",
            "printf 'Password: '; read secret; echo \"got $secret\"",
        ]);
        let mut output = Vec::new();
        let exit = PasswordRelay::new()
            .run(request, b"hunter2", &mut output)
            .unwrap();

        assert_eq!(exit, ChildExit::Exited(0));
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("got hunter2"), "output was {:?}", text);
    }

    #[test]
    fn test_exit_code_of_command_is_returned() {
        let request = LaunchRequest::new("/dev/null", "/bin/sh")
            .args(["-c", "printf 'Password: '; read secret; exit 3"]);
        let mut output = Vec::new();
        let exit = PasswordRelay::new()
            .run(request, b"x", &mut output)
            .unwrap();
        assert_eq!(exit, ChildExit::Exited(3));
    }

    #[test]
    fn test_command_without_prompt_finishes() {
        let request = LaunchRequest::new("/dev/null", "/bin/sh").args(["-c", "echo done; exit 4"]);
        let mut output = Vec::new();
        let exit = PasswordRelay::new()
            .with_prompt_timeout(Duration::from_secs(5))
            .run(request, b"x", &mut output)
            .unwrap();
        assert_eq!(exit, ChildExit::Exited(4));
    }

    #[test]
    fn test_missing_prompt_times_out() {
        let request = LaunchRequest::new("/dev/null", "/bin/sh").args(["-c", "sleep 30"]);
        let mut output = Vec::new();
        let err = PasswordRelay::new()
            .with_prompt_timeout(Duration::from_millis(300))
            .run(request, b"x", &mut output)
            .unwrap_err();
        assert!(matches!(err, LaunchError::RelayTimeout(300)));
    }
}
