use std::ffi::CStr;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::os::fd::FromRawFd;
use std::os::fd::RawFd;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::path::PathBuf;

use crate::error::LaunchError;

/// A freshly allocated pseudo-terminal: the master end is held open here,
/// the slave is addressed by path so it can be handed to [`crate::launch`].
#[derive(Debug)]
pub struct PtyPair {
    master: File,
    slave_path: PathBuf,
}

impl PtyPair {
    pub fn open() -> Result<Self, LaunchError> {
        // SAFETY: posix_openpt has no memory safety preconditions
        let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
        if fd < 0 {
            return Err(LaunchError::Open(io::Error::last_os_error().to_string()));
        }
        // SAFETY: fd was just returned by posix_openpt and is owned by nobody else
        let master = unsafe { File::from_raw_fd(fd) };

        set_cloexec(fd)?;
        // SAFETY: fd is a valid master descriptor
        if unsafe { libc::grantpt(fd) } != 0 || unsafe { libc::unlockpt(fd) } != 0 {
            return Err(LaunchError::Open(io::Error::last_os_error().to_string()));
        }

        let slave_path = slave_name(fd)?;
        Ok(Self { master, slave_path })
    }

    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    pub fn master(&self) -> &File {
        &self.master
    }

    pub fn write_all(&self, data: &[u8]) -> Result<(), LaunchError> {
        (&self.master)
            .write_all(data)
            .map_err(|e| LaunchError::Relay(e.to_string()))
    }

    /// Reads whatever is available within `timeout_ms`.
    ///
    /// `Ok(None)` means the timeout expired. `Ok(Some(0))` means every slave
    /// descriptor is closed; Linux reports that as `EIO`, which is folded in.
    pub fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<Option<usize>, LaunchError> {
        if !wait_readable(self.master.as_raw_fd(), timeout_ms)? {
            return Ok(None);
        }
        loop {
            match (&self.master).read(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EIO) => return Ok(Some(0)),
                Err(e) => return Err(LaunchError::Relay(e.to_string())),
            }
        }
    }
}

fn set_cloexec(fd: RawFd) -> Result<(), LaunchError> {
    // SAFETY: fcntl is safe to call with a valid file descriptor
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(LaunchError::Open(io::Error::last_os_error().to_string()));
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(LaunchError::Open(io::Error::last_os_error().to_string()));
    }
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn slave_name(fd: RawFd) -> Result<PathBuf, LaunchError> {
    let mut buf = [0 as libc::c_char; 128];
    // SAFETY: buf is writable for its full length
    let rc = unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return Err(LaunchError::Open(io::Error::from_raw_os_error(rc).to_string()));
    }
    // SAFETY: ptsname_r NUL-terminated the buffer on success
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn slave_name(fd: RawFd) -> Result<PathBuf, LaunchError> {
    // SAFETY: ptsname returns a pointer to static storage or NULL
    let ptr = unsafe { libc::ptsname(fd) };
    if ptr.is_null() {
        return Err(LaunchError::Open(io::Error::last_os_error().to_string()));
    }
    // SAFETY: non-NULL ptsname results are NUL-terminated
    let name = unsafe { CStr::from_ptr(ptr) };
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}

fn wait_readable(fd: RawFd, timeout_ms: i32) -> Result<bool, LaunchError> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: pollfd is a valid single-element array
        let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(LaunchError::Relay(err.to_string()));
        }
        if result == 0 {
            return Ok(false);
        }
        if pollfd.revents & libc::POLLNVAL != 0 {
            return Err(LaunchError::Relay("poll error on PTY".to_string()));
        }
        // POLLHUP/POLLERR still let read() report EOF or EIO.
        return Ok(true);
    }
}
