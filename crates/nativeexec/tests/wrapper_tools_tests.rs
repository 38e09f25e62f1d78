//! stat, sigqueue and privp tests

mod common;

use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::process::Command as StdCommand;
use std::process::Stdio;

use common::tool;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// stat
// =============================================================================

#[test]
fn test_stat_prints_inode_and_ctime_millis() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("sample.txt");
    std::fs::write(&file, "x").unwrap();
    let meta = std::fs::metadata(&file).unwrap();

    tool("stat")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "inode: {}\nctime: {}\n",
            meta.ino(),
            meta.ctime() * 1000
        )));
}

#[test]
fn test_stat_missing_file_returns_minus_one() {
    let dir = TempDir::new().unwrap();
    tool("stat")
        .arg(dir.path().join("missing"))
        .assert()
        .code(255)
        .stdout(predicate::str::is_empty());
}

// =============================================================================
// sigqueue
// =============================================================================

#[test]
fn test_sigqueue_delivers_signal() {
    let mut child = StdCommand::new("/bin/sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    tool("sigqueue")
        .args([child.id().to_string(), libc::SIGTERM.to_string(), "5".to_string()])
        .assert()
        .success();

    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(libc::SIGTERM));
}

#[test]
fn test_sigqueue_to_missing_process_fails() {
    let mut child = StdCommand::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();

    tool("sigqueue")
        .args([pid.to_string(), "0".to_string(), "1".to_string()])
        .assert()
        .code(255);
}

#[test]
fn test_sigqueue_requires_three_arguments() {
    tool("sigqueue").args(["1", "0"]).assert().failure();
}

// =============================================================================
// privp
// =============================================================================

fn fake_su(dir: &TempDir) -> std::path::PathBuf {
    let script = dir.path().join("su");
    std::fs::write(
        &script,
        "#!/bin/sh\nprintf 'Password: '\nread pw\necho \"pw=$pw args=$*\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[test]
fn test_privp_answers_su_with_password() {
    let dir = TempDir::new().unwrap();
    let su = fake_su(&dir);

    tool("privp")
        .env("NATIVEEXEC_SU", &su)
        .args(["root", "proc_owner", "4242"])
        .write_stdin("s3cret\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("pw=s3cret"))
        .stdout(predicate::str::contains(
            "args=root -c /usr/bin/ppriv -s I+proc_owner 4242",
        ));
}

#[test]
fn test_privp_propagates_su_exit_status() {
    let dir = TempDir::new().unwrap();
    let su = dir.path().join("su");
    std::fs::write(&su, "#!/bin/sh\nprintf 'Password: '\nread pw\nexit 9\n").unwrap();
    std::fs::set_permissions(&su, std::fs::Permissions::from_mode(0o755)).unwrap();

    tool("privp")
        .env("NATIVEEXEC_SU", &su)
        .args(["root", "proc_owner", "1"])
        .write_stdin("wrong\n")
        .assert()
        .code(9);
}

#[test]
fn test_privp_rejects_bad_pid() {
    tool("privp")
        .args(["root", "proc_owner", "not-a-pid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
