use std::fmt;

use uuid::Uuid;

use crate::error::FinderError;

/// Environment entry used as a search key when looking for a launched process.
///
/// The marker is compared byte for byte against whole `NAME=value` entries and
/// is never parsed. Uniqueness is up to whoever injects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker(Vec<u8>);

impl Marker {
    /// Wraps caller supplied bytes, rejecting empty markers and embedded NULs.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, FinderError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(FinderError::InvalidMarker("marker is empty".to_string()));
        }
        if bytes.contains(&0) {
            return Err(FinderError::InvalidMarker(
                "marker contains a NUL byte".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// Builds a fresh `NAME=<uuid>` marker.
    pub fn generate(name: &str) -> Result<Self, FinderError> {
        if name.is_empty() || name.contains('=') {
            return Err(FinderError::InvalidMarker(format!(
                "invalid variable name: {:?}",
                name
            )));
        }
        Self::new(format!("{}={}", name, Uuid::new_v4()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Splits the marker into the variable name and value, for callers that
    /// inject it through an environment map.
    pub fn split_entry(&self) -> (&[u8], &[u8]) {
        match self.0.iter().position(|&b| b == b'=') {
            Some(idx) => (&self.0[..idx], &self.0[idx + 1..]),
            None => (&self.0[..], &[]),
        }
    }

    /// Exact comparison against a single environment entry.
    pub fn matches_entry(&self, entry: &[u8]) -> bool {
        self.0 == entry
    }

    /// Scans a block of NUL-separated entries as read from an environ file.
    ///
    /// Only entries terminated inside `block` are compared; a trailing
    /// fragment cut off by a capped read is ignored.
    pub fn matches_environ_block(&self, block: &[u8]) -> bool {
        terminated_entries(block).any(|entry| self.matches_entry(entry))
    }

    /// Space-delimited token search over one line of `ps -E` output.
    pub fn matches_ps_text(&self, text: &[u8]) -> bool {
        let needle_len = self.0.len() + 1;
        if text.len() < needle_len {
            return false;
        }
        let mut start = 0;
        while start + needle_len <= text.len() {
            let window = &text[start..start + needle_len];
            if window[0] == b' ' && &window[1..] == self.0.as_slice() {
                let after = start + needle_len;
                if after == text.len() || text[after] == b' ' {
                    return true;
                }
            }
            start += 1;
        }
        false
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::str::FromStr for Marker {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.as_bytes().to_vec())
    }
}

/// Iterates the NUL-terminated entries of `block`, without their terminator.
pub(crate) fn terminated_entries(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    let end = block.iter().rposition(|&b| b == 0).map_or(0, |idx| idx + 1);
    block[..end]
        .split_inclusive(|&b| b == 0)
        .map(|entry| &entry[..entry.len() - 1])
}
