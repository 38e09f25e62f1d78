//! Shared helpers for the CLI integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use assert_cmd::Command;
use nativeexec_pty::PtyPair;
use tempfile::TempDir;

pub fn tool(name: &str) -> Command {
    let mut cmd = Command::cargo_bin(name).unwrap();
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("NATIVEEXEC_LOG");
    cmd
}

/// A pty whose slave side stays open for the test's lifetime, so output the
/// launched command leaves behind can still be read after it exits.
pub struct TestPty {
    pair: PtyPair,
    _slave: File,
}

impl TestPty {
    pub fn new() -> Self {
        let pair = PtyPair::open().unwrap();
        let slave = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(pair.slave_path())
            .unwrap();
        Self {
            pair,
            _slave: slave,
        }
    }

    pub fn path(&self) -> &Path {
        self.pair.slave_path()
    }

    pub fn path_str(&self) -> String {
        self.path().to_str().unwrap().to_string()
    }

    /// Collects terminal output until `needle` shows up or `timeout` passes.
    pub fn read_until(&self, needle: &str, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        let mut buf = [0u8; 1024];
        while Instant::now() < deadline {
            if String::from_utf8_lossy(&collected).contains(needle) {
                break;
            }
            match self.pair.read_timeout(&mut buf, 100).unwrap() {
                Some(0) => break,
                Some(n) => collected.extend_from_slice(&buf[..n]),
                None => {}
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }
}

/// A fake `/proc` tree. Each process gets an `environ` file holding the given
/// entries, each NUL-terminated.
pub struct FakeProc {
    pub dir: TempDir,
}

impl FakeProc {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("self")).unwrap();
        Self { dir }
    }

    pub fn add(&self, pid: i32, entries: &[&str]) -> &Self {
        let proc_dir = self.dir.path().join(pid.to_string());
        std::fs::create_dir_all(&proc_dir).unwrap();
        let mut environ = Vec::new();
        for entry in entries {
            environ.extend_from_slice(entry.as_bytes());
            environ.push(0);
        }
        std::fs::write(proc_dir.join("environ"), environ).unwrap();
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
