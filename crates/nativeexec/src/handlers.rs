//! One handler per tool. Each returns the process exit code.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nativeexec_common::error_codes;
use nativeexec_core::FinderConfig;
use nativeexec_core::Marker;
use nativeexec_core::Pid;
use nativeexec_core::ProcessFinder;
use nativeexec_core::env_store;
use nativeexec_core::native_finder;
use nativeexec_pty::LaunchRequest;
use nativeexec_pty::PasswordRelay;
use nativeexec_pty::SignalForwarder;
use nativeexec_pty::launch;
use nativeexec_pty::send_break;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::commands::PfindArgs;
use crate::commands::PrivpArgs;
use crate::commands::ProcessStartArgs;
use crate::commands::SigqueueArgs;
use crate::commands::StatArgs;
use crate::error::report;

const PPRIV_PROGRAM: &str = "/usr/bin/ppriv";
const CONTROLLING_TTY: &str = "/dev/tty";

pub fn process_start(args: &ProcessStartArgs) -> i32 {
    let Some((program, rest)) = args.command.split_first() else {
        eprintln!("Error: no command given");
        return error_codes::EX_USAGE;
    };

    let mut request = LaunchRequest::new(&args.pty, program).args(rest.iter().cloned());
    if let Some(dump) = &args.env_dump {
        match env_store::read(dump) {
            Ok(snapshot) => {
                debug!(entries = snapshot.len(), dump = %dump.display(), "Restoring environment");
                request = request.environment(snapshot.iter().map(<[u8]>::to_vec).collect());
            }
            Err(e) => return report(&e),
        }
    }

    let mut forwarder = match SignalForwarder::install() {
        Ok(forwarder) => Some(forwarder),
        Err(e) => {
            warn!(error = %e, "Signals will not be forwarded to the child");
            None
        }
    };

    let child = match launch(&request) {
        Ok(child) => child,
        Err(e) => return report(&e),
    };

    if let Some(f) = forwarder.as_mut() {
        if let Err(e) = f.forward_to(child.pid()) {
            warn!(error = %e, "Signals will not be forwarded to the child");
        }
    }

    let code = match child.wait() {
        Ok(exit) => exit.exit_code(),
        Err(e) => {
            report(&e);
            error_codes::EX_FAILURE
        }
    };
    drop(forwarder);

    if args.send_break {
        debug!(pty = %args.pty.display(), "Sending break");
        if let Err(e) = send_break(&args.pty) {
            warn!(error = %e, "Could not send break");
        }
    }
    code
}

#[derive(Debug, Serialize)]
struct PfindReport<'a> {
    marker: String,
    pids: &'a [Pid],
}

pub fn pfind(args: &PfindArgs) -> i32 {
    let marker = match Marker::new(args.marker.as_bytes()) {
        Ok(marker) => marker,
        Err(e) => return report(&e),
    };

    let finder = native_finder(&FinderConfig::from_env());
    let pids = match finder.find_by_marker(&marker) {
        Ok(pids) => pids,
        Err(e) if args.json => {
            println!("{}", e.to_json());
            return e.category().exit_code();
        }
        Err(e) => return report(&e),
    };
    debug!(marker = %marker, matches = pids.len(), "Scan finished");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = if args.json {
        let report = PfindReport {
            marker: marker.to_string(),
            pids: pids.pids(),
        };
        match serde_json::to_string(&report) {
            Ok(text) => writeln!(out, "{}", text),
            Err(e) => Err(io::Error::other(e)),
        }
    } else {
        pids.iter().try_for_each(|pid| writeln!(out, "{}", pid))
    };

    match written.and_then(|()| out.flush()) {
        Ok(()) => error_codes::EX_OK,
        Err(e) => {
            eprintln!("Error: failed to write results: {}", e);
            error_codes::EX_IOERR
        }
    }
}

/// Arguments passed to `su` for granting `privileges` to `pid`.
pub fn su_arguments(user: &str, privileges: &str, pid: u32) -> Vec<OsString> {
    vec![
        user.into(),
        "-c".into(),
        format!("{} -s I+{} {}", PPRIV_PROGRAM, privileges, pid).into(),
    ]
}

pub fn privp(args: &PrivpArgs) -> i32 {
    let su_args = su_arguments(&args.user, &args.privileges, args.pid);

    if has_controlling_terminal() {
        debug!("Controlling terminal present, su will prompt on it");
        let err = Command::new(&args.su_program).args(&su_args).exec();
        eprintln!(
            "privp: cannot execute {}: {}",
            args.su_program.to_string_lossy(),
            err
        );
        return error_codes::EX_EXEC_FAILED;
    }

    let password = match read_password(&mut io::stdin().lock()) {
        Ok(password) => password,
        Err(e) => {
            eprintln!("Error: failed to read password from stdin: {}", e);
            return error_codes::EX_IOERR;
        }
    };

    let request = LaunchRequest::new("/dev/null", &args.su_program)
        .args(su_args)
        .tag("privp");
    let stdout = io::stdout();
    match PasswordRelay::new().run(request, &password, &mut stdout.lock()) {
        Ok(exit) => exit.exit_code(),
        Err(e) => report(&e),
    }
}

fn has_controlling_terminal() -> bool {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(CONTROLLING_TTY)
        .is_ok()
}

/// First line of `input` without its line terminator.
fn read_password<R: BufRead>(input: &mut R) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    input.read_until(b'\n', &mut line)?;
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

pub fn sigqueue(args: &SigqueueArgs) -> i32 {
    let rc = queue_signal(args.pid, args.signo, args.value);
    if rc != 0 {
        warn!(
            pid = args.pid,
            signo = args.signo,
            error = %io::Error::last_os_error(),
            "Signal not delivered"
        );
    }
    rc
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn queue_signal(pid: i32, signo: i32, value: i32) -> i32 {
    let payload = libc::sigval {
        sival_ptr: int_payload(value) as *mut libc::c_void,
    };
    // SAFETY: sigqueue copies the payload and has no memory safety preconditions
    unsafe { libc::sigqueue(pid, signo, payload) }
}

/// A `sigval` word whose `sival_int` member reads back as `value`.
///
/// The receiver sees the union through its int member, which overlays the
/// first bytes of the pointer, so the int goes there in native order.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn int_payload(value: i32) -> usize {
    let mut word = [0u8; std::mem::size_of::<usize>()];
    word[..4].copy_from_slice(&value.to_ne_bytes());
    usize::from_ne_bytes(word)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn queue_signal(pid: i32, signo: i32, value: i32) -> i32 {
    debug!(value, "sigqueue unavailable, payload dropped");
    // SAFETY: kill has no memory safety preconditions
    unsafe { libc::kill(pid, signo) }
}

/// The two lines `stat` prints for a file.
pub fn stat_lines(inode: u64, ctime_secs: i64) -> String {
    format!("inode: {}\nctime: {}\n", inode, ctime_secs.saturating_mul(1000))
}

pub fn stat(args: &StatArgs) -> i32 {
    match std::fs::metadata(&args.filename) {
        Ok(meta) => {
            print!("{}", stat_lines(meta.ino(), meta.ctime()));
            let _ = io::stdout().flush();
            0
        }
        Err(e) => {
            debug!(file = %args.filename.display(), error = %e, "stat failed");
            -1
        }
    }
}
