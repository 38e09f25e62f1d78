//! Fork/exec of a command attached to an existing pseudo-terminal.
//!
//! Everything the child needs is allocated before `fork()`. Between fork and
//! exec the child only makes async-signal-safe calls: it may have been forked
//! from a process with a signal forwarding or log writer thread.

use std::ffi::CString;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::path::PathBuf;
use std::ptr;

use nativeexec_common::error_codes;
use tracing::debug;
use tracing::info;

use crate::error::LaunchError;
use crate::forward::FORWARDED_SIGNALS;

const DEFAULT_PATH: &str = "/usr/bin:/bin";
const DEFAULT_TAG: &str = "process_start";

/// What to run and which terminal to run it on.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pty_path: PathBuf,
    program: OsString,
    args: Vec<OsString>,
    environment: Option<Vec<Vec<u8>>>,
    report_pid: bool,
    tag: String,
}

impl LaunchRequest {
    pub fn new(pty_path: impl Into<PathBuf>, program: impl Into<OsString>) -> Self {
        Self {
            pty_path: pty_path.into(),
            program: program.into(),
            args: Vec::new(),
            environment: None,
            report_pid: true,
            tag: DEFAULT_TAG.to_string(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the child's environment with these `NAME=value` entries.
    pub fn environment(mut self, entries: Vec<Vec<u8>>) -> Self {
        self.environment = Some(entries);
        self
    }

    /// Whether the child writes its pid to stdout before anything else.
    pub fn report_pid(mut self, report: bool) -> Self {
        self.report_pid = report;
        self
    }

    /// Name prefixed to diagnostics written by the child.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn pty_path(&self) -> &Path {
        &self.pty_path
    }

    pub fn set_pty_path(&mut self, path: impl Into<PathBuf>) {
        self.pty_path = path.into();
    }
}

/// C-side form of a request, built before forking.
struct ExecPlan {
    pty: CString,
    /// `None` when a bare command name was not found on the search path.
    path: Option<CString>,
    argv: Vec<CString>,
    envp: Vec<CString>,
    setup_diagnostic: Vec<u8>,
    exec_diagnostic: Vec<u8>,
    report_pid: bool,
}

impl ExecPlan {
    fn prepare(request: &LaunchRequest) -> Result<Self, LaunchError> {
        let envp: Vec<CString> = match &request.environment {
            Some(entries) => entries
                .iter()
                .map(|entry| to_cstring(entry, "environment entry"))
                .collect::<Result<_, _>>()?,
            None => std::env::vars_os()
                .map(|(name, value)| {
                    let mut entry = name.as_bytes().to_vec();
                    entry.push(b'=');
                    entry.extend_from_slice(value.as_bytes());
                    to_cstring(&entry, "environment entry")
                })
                .collect::<Result<_, _>>()?,
        };

        let search_path = find_var(&envp, b"PATH");
        let resolved = resolve_program(&request.program, search_path);

        let mut argv = Vec::with_capacity(request.args.len() + 1);
        argv.push(to_cstring(request.program.as_bytes(), "command")?);
        for arg in &request.args {
            argv.push(to_cstring(arg.as_bytes(), "argument")?);
        }

        let setup_diagnostic = format!("{}: terminal setup failed: ", request.tag).into_bytes();
        let exec_diagnostic = format!(
            "{}: cannot execute {}: ",
            request.tag,
            request.program.to_string_lossy()
        )
        .into_bytes();

        Ok(Self {
            pty: to_cstring(request.pty_path.as_os_str().as_bytes(), "pty path")?,
            path: resolved
                .map(|path| to_cstring(path.as_os_str().as_bytes(), "command"))
                .transpose()?,
            argv,
            envp,
            setup_diagnostic,
            exec_diagnostic,
            report_pid: request.report_pid,
        })
    }
}

fn to_cstring(bytes: &[u8], what: &str) -> Result<CString, LaunchError> {
    CString::new(bytes)
        .map_err(|_| LaunchError::InvalidArgument(format!("{} contains a NUL byte", what)))
}

fn find_var<'a>(envp: &'a [CString], name: &[u8]) -> Option<&'a OsStr> {
    envp.iter().find_map(|entry| {
        let value = entry.as_bytes().strip_prefix(name)?.strip_prefix(b"=")?;
        Some(OsStr::from_bytes(value))
    })
}

/// Resolves a bare command name against `search_path` the way `execvp`
/// would. Names containing a slash are returned as is. A bare name that is
/// not found yields `None`; it is never looked up in the current directory
/// unless the search path says so.
pub fn resolve_program(program: &OsStr, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.as_bytes().contains(&b'/') {
        return Some(PathBuf::from(program));
    }
    let search_path = search_path.unwrap_or_else(|| OsStr::new(DEFAULT_PATH));
    for dir in std::env::split_paths(search_path) {
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// How a launched child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
}

impl ChildExit {
    fn from_wait_status(status: libc::c_int) -> Option<Self> {
        if libc::WIFEXITED(status) {
            Some(ChildExit::Exited(libc::WEXITSTATUS(status)))
        } else if libc::WIFSIGNALED(status) {
            Some(ChildExit::Signaled(libc::WTERMSIG(status)))
        } else {
            None
        }
    }

    /// Exit code to propagate: the child's own on a normal exit, failure
    /// otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChildExit::Exited(code) => *code,
            ChildExit::Signaled(_) => error_codes::EX_FAILURE,
        }
    }
}

/// Parent-side handle of a launched child.
#[derive(Debug)]
pub struct LaunchedChild {
    pid: libc::pid_t,
}

impl LaunchedChild {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Blocks until the child terminates.
    pub fn wait(&self) -> Result<ChildExit, LaunchError> {
        loop {
            let mut status: libc::c_int = 0;
            // SAFETY: waitpid only writes the status through a valid pointer
            let ret = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if ret == self.pid {
                if let Some(exit) = ChildExit::from_wait_status(status) {
                    debug!(pid = self.pid, ?exit, "Child terminated");
                    return Ok(exit);
                }
                continue;
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(LaunchError::Wait(err.to_string()));
        }
    }

    /// Non-blocking check; `None` while the child is still running.
    pub fn try_wait(&self) -> Result<Option<ChildExit>, LaunchError> {
        let mut status: libc::c_int = 0;
        // SAFETY: waitpid only writes the status through a valid pointer
        let ret = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
        if ret == 0 {
            return Ok(None);
        }
        if ret < 0 {
            return Err(LaunchError::Wait(io::Error::last_os_error().to_string()));
        }
        Ok(ChildExit::from_wait_status(status))
    }

    pub fn signal(&self, signal: libc::c_int) -> io::Result<()> {
        // SAFETY: kill has no memory safety preconditions
        if unsafe { libc::kill(self.pid, signal) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Forks a child that becomes a session leader on the request's pty and
/// execs the command.
///
/// Returns as soon as the child exists. Setup or exec failures in the child
/// show up as its exit status: 71 for terminal setup, 127 for exec.
pub fn launch(request: &LaunchRequest) -> Result<LaunchedChild, LaunchError> {
    let plan = ExecPlan::prepare(request)?;

    let mut argv: Vec<*const libc::c_char> = plan.argv.iter().map(|s| s.as_ptr()).collect();
    argv.push(ptr::null());
    let mut envp: Vec<*const libc::c_char> = plan.envp.iter().map(|s| s.as_ptr()).collect();
    envp.push(ptr::null());

    // Buffered output would otherwise be flushed twice.
    let _ = io::stdout().flush();

    // SAFETY: the child branch only calls async-signal-safe functions on
    // data prepared above and never returns.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(LaunchError::Fork(io::Error::last_os_error().to_string()));
    }
    if pid == 0 {
        // SAFETY: we are the freshly forked child
        unsafe { exec_child(&plan, &argv, &envp) }
    }

    info!(
        pid,
        program = %request.program.to_string_lossy(),
        pty = %request.pty_path.display(),
        "Launched child"
    );
    Ok(LaunchedChild { pid })
}

unsafe fn exec_child(
    plan: &ExecPlan,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> ! {
    if plan.report_pid {
        let mut line = [0u8; 24];
        let line = format_pid_line(libc::getpid(), &mut line);
        write_all_fd(libc::STDOUT_FILENO, line);
    }

    let saved_stdout = libc::fcntl(libc::STDOUT_FILENO, libc::F_DUPFD_CLOEXEC, 3);

    if libc::setsid() == -1 {
        fail(saved_stdout, &plan.setup_diagnostic, error_codes::EX_OSERR);
    }
    libc::signal(libc::SIGINT, libc::SIG_DFL);
    // Handlers inherited from a forwarder in the parent would route these
    // back through the parent until exec.
    for sig in FORWARDED_SIGNALS {
        libc::signal(sig, libc::SIG_DFL);
    }

    let fd = libc::open(plan.pty.as_ptr(), libc::O_RDWR);
    if fd < 0 {
        fail(saved_stdout, &plan.setup_diagnostic, error_codes::EX_OSERR);
    }

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        if libc::ioctl(fd, libc::TIOCSCTTY as _, 0) == -1 {
            fail(saved_stdout, &plan.setup_diagnostic, error_codes::EX_OSERR);
        }
    }

    if libc::dup2(fd, libc::STDIN_FILENO) < 0
        || libc::dup2(fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(fd, libc::STDERR_FILENO) < 0
    {
        fail(saved_stdout, &plan.setup_diagnostic, error_codes::EX_OSERR);
    }
    if fd > libc::STDERR_FILENO {
        libc::close(fd);
    }

    let Some(path) = &plan.path else {
        fail_with(
            saved_stdout,
            &plan.exec_diagnostic,
            libc::ENOENT,
            error_codes::EX_EXEC_FAILED,
        );
    };
    libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr());
    fail(saved_stdout, &plan.exec_diagnostic, error_codes::EX_EXEC_FAILED);
}

/// Puts the saved stdout back, reports `errno` after `prefix` and exits.
unsafe fn fail(saved_stdout: libc::c_int, prefix: &[u8], code: i32) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    fail_with(saved_stdout, prefix, errno, code)
}

unsafe fn fail_with(saved_stdout: libc::c_int, prefix: &[u8], errno: libc::c_int, code: i32) -> ! {
    if saved_stdout >= 0 {
        libc::dup2(saved_stdout, libc::STDOUT_FILENO);
    }
    write_all_fd(libc::STDOUT_FILENO, prefix);
    let text = libc::strerror(errno);
    if !text.is_null() {
        let len = libc::strlen(text);
        write_all_fd(
            libc::STDOUT_FILENO,
            std::slice::from_raw_parts(text as *const u8, len),
        );
    }
    write_all_fd(libc::STDOUT_FILENO, b"\n");
    libc::_exit(code)
}

unsafe fn write_all_fd(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len());
        if n < 0 {
            if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// Formats `pid` followed by a newline into `buf` without allocating.
pub fn format_pid_line(pid: libc::pid_t, buf: &mut [u8; 24]) -> &[u8] {
    let mut digits = [0u8; 20];
    let mut value = (pid as i64).unsigned_abs();
    let mut n = 0;
    loop {
        digits[n] = b'0' + (value % 10) as u8;
        n += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }

    let mut len = 0;
    if pid < 0 {
        buf[len] = b'-';
        len += 1;
    }
    for digit in digits[..n].iter().rev() {
        buf[len] = *digit;
        len += 1;
    }
    buf[len] = b'\n';
    &buf[..len + 1]
}

/// Sends a break condition on the terminal at `pty_path`.
pub fn send_break(pty_path: &Path) -> Result<(), LaunchError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(pty_path)
        .map_err(|e| LaunchError::Break(format!("{}: {}", pty_path.display(), e)))?;

    // SAFETY: tcsendbreak is safe to call with a valid file descriptor
    if unsafe { libc::tcsendbreak(file.as_raw_fd(), 0) } != 0 {
        return Err(LaunchError::Break(io::Error::last_os_error().to_string()));
    }
    debug!(pty = %pty_path.display(), "Sent break");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_pid_line() {
        let mut buf = [0u8; 24];
        assert_eq!(format_pid_line(4242, &mut buf), b"4242\n");
        assert_eq!(format_pid_line(1, &mut buf), b"1\n");
        assert_eq!(format_pid_line(0, &mut buf), b"0\n");
        assert_eq!(
            format_pid_line(libc::pid_t::MAX, &mut buf),
            format!("{}\n", libc::pid_t::MAX).as_bytes()
        );
        assert_eq!(format_pid_line(-7, &mut buf), b"-7\n");
    }

    #[test]
    fn test_resolve_program_with_slash_is_untouched() {
        let resolved = resolve_program(OsStr::new("./run.sh"), Some(OsStr::new("/bin")));
        assert_eq!(resolved, Some(PathBuf::from("./run.sh")));
    }

    #[test]
    fn test_resolve_program_searches_path() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("mytool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let not_exec = dir.path().join("plain");
        std::fs::write(&not_exec, "").unwrap();

        let search = std::env::join_paths(["/nonexistent", dir.path().to_str().unwrap()]).unwrap();
        assert_eq!(resolve_program(OsStr::new("mytool"), Some(&search)), Some(tool));
        assert_eq!(resolve_program(OsStr::new("plain"), Some(&search)), None);
    }

    #[test]
    fn test_resolve_missing_program_is_not_found() {
        let resolved = resolve_program(OsStr::new("no-such-tool-xyz"), Some(OsStr::new("/nonexistent")));
        assert_eq!(resolved, None);
        assert_eq!(resolve_program(OsStr::new(""), None), None);
    }

    #[test]
    fn test_plan_uses_replacement_environment() {
        let request = LaunchRequest::new("/dev/null", "true")
            .environment(vec![b"PATH=/nonexistent".to_vec(), b"A=1".to_vec()]);
        let plan = ExecPlan::prepare(&request).unwrap();
        assert_eq!(plan.envp.len(), 2);
        assert!(plan.path.is_none());
        assert_eq!(plan.argv[0].as_bytes(), b"true");
    }

    #[test]
    fn test_plan_rejects_nul_argument() {
        let request = LaunchRequest::new("/dev/null", "echo").args(["a\0b"]);
        let err = ExecPlan::prepare(&request).err().unwrap();
        assert!(matches!(err, LaunchError::InvalidArgument(_)));
    }

    #[test]
    fn test_plan_diagnostics_carry_tag() {
        let request = LaunchRequest::new("/dev/null", "foo").tag("privp");
        let plan = ExecPlan::prepare(&request).unwrap();
        assert!(plan.exec_diagnostic.starts_with(b"privp: cannot execute foo"));
        assert!(plan.setup_diagnostic.starts_with(b"privp: "));
    }

    #[test]
    fn test_child_exit_codes() {
        assert_eq!(ChildExit::Exited(0).exit_code(), 0);
        assert_eq!(ChildExit::Exited(3).exit_code(), 3);
        assert_eq!(ChildExit::Signaled(libc::SIGKILL).exit_code(), 1);
    }
}
