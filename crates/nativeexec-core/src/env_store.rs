//! Snapshot and restore of the process environment through a locked file.
//!
//! The file holds a native-endian `i32` entry count followed by exactly that
//! many NUL-terminated `NAME=value` strings. Writers hold an exclusive
//! `flock(2)` and readers a shared one; both are non-blocking, so contention
//! surfaces as [`EnvStoreError::Locked`] instead of a wait.
//!
//! Only peers that also use `flock` are excluded. On Linux a peer holding a
//! `fcntl` (`F_SETLK`/`lockf`) record lock on the same file is not seen, and
//! does not see ours; BSD and macOS tie the two kinds together.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Write;
use std::ops::Range;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use tracing::debug;

use crate::error::EnvStoreError;

const COUNT_SIZE: usize = std::mem::size_of::<i32>();

/// The ambient environment as `NAME=value` byte strings.
pub fn current_environment() -> Vec<Vec<u8>> {
    std::env::vars_os()
        .map(|(name, value)| {
            let mut entry = Vec::with_capacity(name.len() + value.len() + 1);
            entry.extend_from_slice(name.as_bytes());
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            entry
        })
        .collect()
}

/// A file holding an advisory lock; the lock is released when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Takes an exclusive lock without blocking.
    pub fn exclusive(file: File, path: &Path) -> Result<Self, EnvStoreError> {
        Self::acquire(file, path, libc::LOCK_EX)
    }

    /// Takes a shared lock without blocking.
    pub fn shared(file: File, path: &Path) -> Result<Self, EnvStoreError> {
        Self::acquire(file, path, libc::LOCK_SH)
    }

    fn acquire(file: File, path: &Path, mode: libc::c_int) -> Result<Self, EnvStoreError> {
        loop {
            // SAFETY: flock is safe to call with a valid file descriptor
            let result = unsafe { libc::flock(file.as_raw_fd(), mode | libc::LOCK_NB) };
            if result == 0 {
                return Ok(Self { file });
            }
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => {
                    return Err(EnvStoreError::Locked {
                        path: path.to_path_buf(),
                    });
                }
                _ => return Err(EnvStoreError::io("lock", path, err)),
            }
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

/// Packs `entries` into the dump format.
pub fn pack(entries: &[Vec<u8>]) -> Result<Vec<u8>, String> {
    let count = i32::try_from(entries.len()).map_err(|_| "too many entries".to_string())?;
    let payload: usize = entries.iter().map(|e| e.len() + 1).sum();
    let mut blob = Vec::with_capacity(COUNT_SIZE + payload);
    blob.extend_from_slice(&count.to_ne_bytes());
    for entry in entries {
        if entry.contains(&0) {
            return Err("entry contains a NUL byte".to_string());
        }
        blob.extend_from_slice(entry);
        blob.push(0);
    }
    Ok(blob)
}

/// Writes the current environment to `path`.
pub fn dump(path: &Path) -> Result<(), EnvStoreError> {
    dump_entries(path, &current_environment())
}

/// Writes `entries` to `path` under an exclusive lock.
///
/// The file is truncated only once the lock is held, so a reader holding the
/// shared lock never sees a half-written dump.
pub fn dump_entries(path: &Path, entries: &[Vec<u8>]) -> Result<(), EnvStoreError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
        .map_err(|e| EnvStoreError::io("open", path, e))?;

    let lock = FileLock::exclusive(file, path)?;
    let blob = pack(entries).map_err(|reason| EnvStoreError::corrupt(path, reason))?;

    let mut file = lock.file();
    file.set_len(0)
        .map_err(|e| EnvStoreError::io("truncate", path, e))?;
    file.write_all(&blob)
        .map_err(|e| EnvStoreError::io("write", path, e))?;
    file.flush()
        .map_err(|e| EnvStoreError::io("write", path, e))?;

    debug!(path = %path.display(), entries = entries.len(), bytes = blob.len(), "Dumped environment");
    Ok(())
}

/// Loads a dump written by [`dump`].
pub fn read(path: &Path) -> Result<EnvSnapshot, EnvStoreError> {
    let file = File::open(path).map_err(|e| EnvStoreError::io("open", path, e))?;
    let lock = FileLock::shared(file, path)?;

    let size = lock
        .file()
        .metadata()
        .map_err(|e| EnvStoreError::io("stat", path, e))?
        .len();
    let size = usize::try_from(size).map_err(|_| EnvStoreError::corrupt(path, "file too large"))?;
    if size < COUNT_SIZE {
        return Err(EnvStoreError::corrupt(path, "missing entry count"));
    }

    let mut file = lock.file();
    let mut count = [0u8; COUNT_SIZE];
    file.read_exact(&mut count)
        .map_err(|e| EnvStoreError::io("read", path, e))?;
    let count = i32::from_ne_bytes(count);

    let mut payload = vec![0u8; size - COUNT_SIZE];
    file.read_exact(&mut payload)
        .map_err(|e| EnvStoreError::io("read", path, e))?;

    let snapshot =
        EnvSnapshot::from_payload(count, payload).map_err(|reason| EnvStoreError::corrupt(path, reason))?;
    debug!(path = %path.display(), entries = snapshot.len(), "Read environment dump");
    Ok(snapshot)
}

/// Environment loaded from a dump.
///
/// Entries are views into one owned buffer and live exactly as long as the
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSnapshot {
    buf: Vec<u8>,
    spans: Vec<Range<usize>>,
}

impl EnvSnapshot {
    /// Splits `payload` into exactly `count` NUL-terminated entries.
    pub fn from_payload(count: i32, payload: Vec<u8>) -> Result<Self, String> {
        let count = usize::try_from(count).map_err(|_| format!("negative entry count {}", count))?;
        if count > payload.len() {
            return Err(format!(
                "entry count {} exceeds payload of {} bytes",
                count,
                payload.len()
            ));
        }

        let mut spans = Vec::with_capacity(count);
        let mut start = 0;
        for index in 0..count {
            let Some(len) = payload[start..].iter().position(|&b| b == 0) else {
                return Err(format!("entry {} of {} is not terminated", index + 1, count));
            };
            spans.push(start..start + len);
            start += len + 1;
        }
        if start != payload.len() {
            return Err(format!(
                "{} trailing bytes after {} entries",
                payload.len() - start,
                count
            ));
        }

        Ok(Self { buf: payload, spans })
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.spans.get(index).map(|span| &self.buf[span.clone()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.spans.iter().map(|span| &self.buf[span.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn entries(list: &[&str]) -> Vec<Vec<u8>> {
        list.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_pack_layout() {
        let blob = pack(&entries(&["A=1", "B="])).unwrap();
        assert_eq!(&blob[..4], &2i32.to_ne_bytes());
        assert_eq!(&blob[4..], b"A=1\0B=\0");
    }

    #[test]
    fn test_pack_rejects_nul() {
        assert!(pack(&[b"A\0=1".to_vec()]).is_err());
    }

    #[test]
    fn test_from_payload_count_mismatch() {
        assert!(EnvSnapshot::from_payload(3, b"A=1\0B=2\0".to_vec()).is_err());
        assert!(EnvSnapshot::from_payload(1, b"A=1\0B=2\0".to_vec()).is_err());
        assert!(EnvSnapshot::from_payload(-1, Vec::new()).is_err());
        assert!(EnvSnapshot::from_payload(1, b"A=1".to_vec()).is_err());
    }

    #[test]
    fn test_from_payload_empty() {
        let snapshot = EnvSnapshot::from_payload(0, Vec::new()).unwrap();
        assert!(snapshot.is_empty());
        assert!(EnvSnapshot::from_payload(0, b"junk".to_vec()).is_err());
    }

    #[test]
    fn test_dump_and_read_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        let written = entries(&["PATH=/bin:/usr/bin", "EMPTY=", "TAG=x y z"]);

        dump_entries(&path, &written).unwrap();
        let snapshot = read(&path).unwrap();
        let loaded: Vec<Vec<u8>> = snapshot.iter().map(|e| e.to_vec()).collect();
        assert_eq!(loaded, written);
    }

    #[test]
    fn test_dump_truncates_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump_entries(&path, &entries(&["LONG=aaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "B=2"])).unwrap();
        dump_entries(&path, &entries(&["S=1"])).unwrap();

        let snapshot = read(&path).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(0), Some(&b"S=1"[..]));
    }

    #[test]
    fn test_dump_current_environment_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump(&path).unwrap();

        let mut expected = current_environment();
        let mut loaded: Vec<Vec<u8>> = read(&path).unwrap().iter().map(|e| e.to_vec()).collect();
        expected.sort();
        loaded.sort();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_dump_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump_entries(&path, &entries(&["A=1"])).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_read_while_exclusively_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump_entries(&path, &entries(&["A=1"])).unwrap();

        let writer = OpenOptions::new().write(true).open(&path).unwrap();
        let _held = FileLock::exclusive(writer, &path).unwrap();

        let err = read(&path).unwrap_err();
        assert!(matches!(err, EnvStoreError::Locked { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_dump_while_shared_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump_entries(&path, &entries(&["A=1"])).unwrap();

        let reader = File::open(&path).unwrap();
        let _held = FileLock::shared(reader, &path).unwrap();

        let err = dump_entries(&path, &entries(&["B=2"])).unwrap_err();
        assert!(matches!(err, EnvStoreError::Locked { .. }));
        // The held lock protected the old content.
        drop(_held);
        assert_eq!(read(&path).unwrap().get(0), Some(&b"A=1"[..]));
    }

    #[test]
    fn test_concurrent_readers_share_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump_entries(&path, &entries(&["A=1"])).unwrap();

        let reader = File::open(&path).unwrap();
        let _held = FileLock::shared(reader, &path).unwrap();
        assert_eq!(read(&path).unwrap().len(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_fcntl_record_lock_does_not_exclude_dump() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        dump_entries(&path, &entries(&["A=1"])).unwrap();

        let peer = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        // SAFETY: zeroed flock is a valid "whole file" request once the type is set
        let mut record: libc::flock = unsafe { std::mem::zeroed() };
        record.l_type = libc::F_WRLCK as libc::c_short;
        record.l_whence = libc::SEEK_SET as libc::c_short;
        // SAFETY: peer is open and record outlives the call
        assert_eq!(unsafe { libc::fcntl(peer.as_raw_fd(), libc::F_SETLK, &record) }, 0);

        dump_entries(&path, &entries(&["B=2"])).unwrap();
        assert_eq!(read(&path).unwrap().get(0), Some(&b"B=2"[..]));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, EnvStoreError::Io { operation: "open", .. }));
    }

    #[test]
    fn test_read_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.dump");
        let mut blob = pack(&entries(&["A=1", "B=2"])).unwrap();
        blob.truncate(blob.len() - 2);
        std::fs::write(&path, &blob).unwrap();
        assert!(matches!(read(&path).unwrap_err(), EnvStoreError::Corrupt { .. }));

        std::fs::write(&path, b"ab").unwrap();
        assert!(matches!(read(&path).unwrap_err(), EnvStoreError::Corrupt { .. }));
    }

    proptest! {
        #[test]
        fn prop_packed_entries_parse_back(
            list in prop::collection::vec(prop::collection::vec(1u8..=255, 0..24), 0..16)
        ) {
            let blob = pack(&list).unwrap();
            let count = i32::from_ne_bytes(blob[..4].try_into().unwrap());
            let snapshot = EnvSnapshot::from_payload(count, blob[4..].to_vec()).unwrap();
            let parsed: Vec<Vec<u8>> = snapshot.iter().map(|e| e.to_vec()).collect();
            prop_assert_eq!(parsed, list);
        }

        #[test]
        fn prop_wrong_count_is_rejected(
            list in prop::collection::vec(prop::collection::vec(1u8..=255, 0..24), 1..16),
            delta in 1i32..4,
        ) {
            let blob = pack(&list).unwrap();
            let count = i32::from_ne_bytes(blob[..4].try_into().unwrap());
            prop_assert!(EnvSnapshot::from_payload(count + delta, blob[4..].to_vec()).is_err());
            prop_assert!(EnvSnapshot::from_payload(count - 1, blob[4..].to_vec()).is_err());
        }
    }
}
