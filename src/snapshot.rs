//! Live read snapshots, oldest first.
//!
//! A [`SnapshotList`] is not internally synchronized. The engine mutates it
//! under its own metadata lock; concurrent unsynchronized mutation is not
//! supported.

use crate::key::SequenceNumber;
use crate::LError;
use log::error;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// A pinned sequence number. Must be handed back to the list that created
/// it through [`SnapshotList::release`]; dropping it keeps the snapshot live.
#[must_use]
#[derive(Debug)]
pub struct Snapshot {
    list_id: u64,
    token: u64,
    seq: SequenceNumber,
}

impl Snapshot {
    pub fn sequence_number(&self) -> SequenceNumber {
        self.seq
    }
}

pub struct SnapshotList {
    id: u64,
    // token of slots[0]
    base: u64,
    // released snapshots leave a None behind; neither end is ever None
    slots: VecDeque<Option<SequenceNumber>>,
    live: usize,
}

impl Default for SnapshotList {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotList {
    pub fn new() -> Self {
        Self {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            base: 0,
            slots: VecDeque::new(),
            live: 0,
        }
    }

    /// Appends a snapshot at the newest end. Sequence numbers are expected to
    /// be non-decreasing across calls.
    pub fn new_snapshot(&mut self, seq: SequenceNumber) -> Snapshot {
        if let Some(Some(newest)) = self.slots.back() {
            if seq < *newest {
                error!(
                    "snapshot at sequence {} created after snapshot at {}",
                    seq, newest
                );
            }
        }
        let token = self.base + self.slots.len() as u64;
        self.slots.push_back(Some(seq));
        self.live += 1;
        Snapshot {
            list_id: self.id,
            token,
            seq,
        }
    }

    /// Removes `s` from the list. Fails without touching the list if `s` was
    /// created by another list, and hands `s` back so it can still be
    /// released into its own list.
    pub fn release(&mut self, s: Snapshot) -> Result<(), (LError, Snapshot)> {
        if s.list_id != self.id {
            error!(
                "snapshot at sequence {} released into a list it does not belong to",
                s.seq
            );
            return Err((
                LError::precondition("snapshot released into a foreign list"),
                s,
            ));
        }
        let slot = s
            .token
            .checked_sub(self.base)
            .and_then(|i| self.slots.get_mut(i as usize))
            .filter(|slot| **slot == Some(s.seq));
        match slot {
            Some(slot) => *slot = None,
            None => {
                error!("snapshot at sequence {} is no longer live", s.seq);
                return Err((LError::precondition("snapshot is no longer live"), s));
            }
        }
        self.live -= 1;
        while let Some(None) = self.slots.front() {
            self.slots.pop_front();
            self.base += 1;
        }
        while let Some(None) = self.slots.back() {
            self.slots.pop_back();
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn oldest(&self) -> Result<SequenceNumber, LError> {
        self.slots
            .front()
            .copied()
            .flatten()
            .ok_or_else(|| LError::precondition("oldest() on an empty snapshot list"))
    }

    pub fn newest(&self) -> Result<SequenceNumber, LError> {
        self.slots
            .back()
            .copied()
            .flatten()
            .ok_or_else(|| LError::precondition("newest() on an empty snapshot list"))
    }

    /// Live sequence numbers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }
}

#[cfg(test)]
mod test {
    use crate::snapshot::SnapshotList;

    #[test]
    fn test_oldest_and_newest() {
        let mut list = SnapshotList::new();
        assert!(list.is_empty());
        assert!(list.oldest().unwrap_err().is_precondition());
        assert!(list.newest().unwrap_err().is_precondition());

        let s10 = list.new_snapshot(10);
        let s20 = list.new_snapshot(20);
        let s30 = list.new_snapshot(30);
        assert_eq!(s20.sequence_number(), 20);
        assert_eq!(list.len(), 3);
        assert_eq!(list.oldest().unwrap(), 10);
        assert_eq!(list.newest().unwrap(), 30);

        list.release(s10).unwrap();
        assert_eq!(list.oldest().unwrap(), 20);
        assert_eq!(list.newest().unwrap(), 30);
        list.release(s30).unwrap();
        assert_eq!(list.newest().unwrap(), 20);
        list.release(s20).unwrap();
        assert!(list.is_empty());
        assert!(list.oldest().is_err());
        assert!(list.newest().is_err());
    }

    #[test]
    fn test_release_from_the_middle() {
        let mut list = SnapshotList::default();
        let snaps = (1..=5u64)
            .map(|i| list.new_snapshot(i * 100))
            .collect::<Vec<_>>();
        let mut snaps = snaps.into_iter();
        let s100 = snaps.next().unwrap();
        let s200 = snaps.next().unwrap();
        let s300 = snaps.next().unwrap();
        let s400 = snaps.next().unwrap();
        let s500 = snaps.next().unwrap();

        list.release(s300).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![100, 200, 400, 500]);
        list.release(s200).unwrap();
        assert_eq!(list.oldest().unwrap(), 100);
        list.release(s100).unwrap();
        assert_eq!(list.oldest().unwrap(), 400);

        // snapshots created after a release keep their order
        let s600 = list.new_snapshot(600);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![400, 500, 600]);
        list.release(s500).unwrap();
        list.release(s400).unwrap();
        assert_eq!(list.oldest().unwrap(), 600);
        assert_eq!(list.len(), 1);
        list.release(s600).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_equal_sequence_numbers() {
        let mut list = SnapshotList::new();
        let a = list.new_snapshot(7);
        let b = list.new_snapshot(7);
        list.release(b).unwrap();
        assert_eq!(list.oldest().unwrap(), 7);
        list.release(a).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_foreign_release_is_rejected() {
        let mut l1 = SnapshotList::new();
        let mut l2 = SnapshotList::new();
        let s1 = l1.new_snapshot(1);
        let _s2 = l2.new_snapshot(2);
        let (err, s1) = l2.release(s1).unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(s1.sequence_number(), 1);
        // neither list was touched
        assert_eq!(l1.len(), 1);
        assert_eq!(l2.len(), 1);
        assert_eq!(l1.oldest().unwrap(), 1);
        assert_eq!(l2.oldest().unwrap(), 2);

        // the rejected snapshot can still be released where it came from
        l1.release(s1).unwrap();
        assert!(l1.is_empty());
        assert!(l1.oldest().is_err());
    }
}
