//! Time-windowed buffer that pairs deletions and creations into moves.
//!
//! Every notification waits `threshold` before it is released. When an
//! entry is released, a buffered entry of the opposite kind carrying the
//! same stable identity turns the pair into one [`FsMovedEvent`].
//!
//! The buffer is plain data driven by explicit instants so that the owning
//! actor decides when to flush, and tests need no real clock.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use docsync_core::{FsEvent, FsMovedEvent, SyncEvent, WatcherChangeType};

/// A classified notification waiting in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: WatcherChangeType,
    pub path: PathBuf,
    pub is_directory: bool,
    pub local_id: Option<Uuid>,
}

impl Notification {
    fn into_event(self) -> SyncEvent {
        SyncEvent::Fs(FsEvent {
            kind: self.kind,
            path: self.path,
            is_directory: self.is_directory,
            local_id: self.local_id,
        })
    }
}

#[derive(Debug)]
struct Pending {
    note: Notification,
}

/// Move-correlating debounce buffer.
#[derive(Debug)]
pub struct Debouncer {
    threshold: Duration,
    /// Buffered entries by arrival sequence.
    entries: BTreeMap<u64, Pending>,
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    next_seq: u64,
}

impl Debouncer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold: threshold.max(Duration::from_millis(1)),
            entries: BTreeMap::new(),
            deadlines: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Buffer a notification received at `now`.
    pub fn push(&mut self, note: Notification, now: Instant) {
        if note.kind == WatcherChangeType::Changed
            && self
                .entries
                .values()
                .any(|p| p.note.kind == WatcherChangeType::Changed && p.note.path == note.path)
        {
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(seq, Pending { note });
        self.deadlines.push(Reverse((now + self.threshold, seq)));
    }

    /// When the oldest live entry is due.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, seq))) = self.deadlines.peek().copied() {
            if self.entries.contains_key(&seq) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Release every entry due at `now`, in arrival order of the released
    /// entries.
    pub fn flush(&mut self, now: Instant) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Some(Reverse((deadline, seq))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            let Some(pending) = self.entries.remove(&seq) else {
                continue;
            };
            out.push(self.release(pending.note));
        }
        out
    }

    /// Release everything regardless of age.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Some((_, pending)) = self.entries.pop_first() {
            out.push(self.release(pending.note));
        }
        self.deadlines.clear();
        out
    }

    fn release(&mut self, note: Notification) -> SyncEvent {
        let partner_kind = match note.kind {
            WatcherChangeType::Created => WatcherChangeType::Deleted,
            WatcherChangeType::Deleted => WatcherChangeType::Created,
            WatcherChangeType::Changed => return note.into_event(),
        };
        let Some(id) = note.local_id else {
            return note.into_event();
        };

        let partner = self
            .entries
            .iter()
            .find(|(_, p)| p.note.kind == partner_kind && p.note.local_id == Some(id))
            .map(|(seq, _)| *seq);
        let Some(partner) = partner.and_then(|seq| self.entries.remove(&seq)) else {
            return note.into_event();
        };

        let (deleted, created) = if note.kind == WatcherChangeType::Deleted {
            (note, partner.note)
        } else {
            (partner.note, note)
        };
        SyncEvent::FsMoved(FsMovedEvent {
            old_path: deleted.path,
            new_path: created.path,
            is_directory: created.is_directory,
            local_id: Some(id),
        })
    }
}
