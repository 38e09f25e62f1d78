use crate::Pid;

/// Number of slots added whenever the list runs out of room.
pub const GROWTH_CHUNK: usize = 10;

/// Zero-terminated list of process ids produced by a finder.
///
/// The backing vector always ends with a `0` sentinel, even when empty, so
/// `as_terminated()` can be handed to code expecting a NUL-terminated
/// `pid_t` array. Storage grows by `GROWTH_CHUNK` slots at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidList {
    slots: Vec<Pid>,
}

impl Default for PidList {
    fn default() -> Self {
        Self::new()
    }
}

impl PidList {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(GROWTH_CHUNK);
        slots.push(0);
        Self { slots }
    }

    /// Appends a pid in front of the sentinel. Zero and negative ids are
    /// ignored since they cannot name a single process.
    pub fn push(&mut self, pid: Pid) {
        if pid <= 0 {
            return;
        }
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(GROWTH_CHUNK);
        }
        let sentinel = self.slots.len() - 1;
        self.slots.insert(sentinel, pid);
    }

    /// The pids found, without the sentinel.
    pub fn pids(&self) -> &[Pid] {
        &self.slots[..self.slots.len() - 1]
    }

    /// The raw zero-terminated array.
    pub fn as_terminated(&self) -> &[Pid] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids().contains(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids().iter().copied()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}

impl FromIterator<Pid> for PidList {
    fn from_iter<I: IntoIterator<Item = Pid>>(iter: I) -> Self {
        let mut list = PidList::new();
        for pid in iter {
            list.push(pid);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_terminated() {
        let list = PidList::new();
        assert!(list.is_empty());
        assert_eq!(list.as_terminated(), &[0]);
        assert!(list.pids().is_empty());
    }

    #[test]
    fn test_push_keeps_sentinel_last() {
        let mut list = PidList::new();
        list.push(42);
        list.push(7);
        assert_eq!(list.pids(), &[42, 7]);
        assert_eq!(list.as_terminated(), &[42, 7, 0]);
        assert!(list.contains(7));
        assert!(!list.contains(0));
    }

    #[test]
    fn test_non_positive_pids_ignored() {
        let mut list = PidList::new();
        list.push(0);
        list.push(-3);
        assert!(list.is_empty());
    }

    #[test]
    fn test_growth_past_first_chunk() {
        let list: PidList = (1..=35).collect();
        assert_eq!(list.len(), 35);
        assert_eq!(*list.as_terminated().last().unwrap(), 0);
        assert!(list.capacity() >= 36);
        assert_eq!(list.iter().sum::<Pid>(), (1..=35).sum::<Pid>());
    }
}
