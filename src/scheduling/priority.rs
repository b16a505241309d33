//! Priorities and the mutable-priority pending queue.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{PENDING_COMPACT_MIN_LEN, PENDING_COMPACT_RATIO};
use crate::fingerprint::Fingerprint;

/// Scheduling priority ordinal.
///
/// Five canonical steps plus the integer extremes. Higher sorts first; ties
/// are broken by insertion order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Priority(i64);

impl Priority {
    pub const LOWEST: Priority = Priority(i64::MIN);
    pub const VERY_LOW: Priority = Priority(-8);
    pub const LOW: Priority = Priority(-4);
    pub const NORMAL: Priority = Priority(0);
    pub const HIGH: Priority = Priority(4);
    pub const VERY_HIGH: Priority = Priority(8);
    pub const HIGHEST: Priority = Priority(i64::MAX);

    pub const fn ordinal(self) -> i64 {
        self.0
    }

    pub const fn from_ordinal(ordinal: i64) -> Self {
        Self(ordinal)
    }

    /// One step up the coalescing ladder: anything below normal promotes to
    /// normal, then normal → high → very high. Bounded above.
    #[must_use]
    pub fn promoted(self) -> Self {
        if self < Self::NORMAL {
            Self::NORMAL
        } else if self < Self::HIGH {
            Self::HIGH
        } else if self < Self::VERY_HIGH {
            Self::VERY_HIGH
        } else {
            self
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LOWEST => f.write_str("lowest"),
            Self::VERY_LOW => f.write_str("very_low"),
            Self::LOW => f.write_str("low"),
            Self::NORMAL => f.write_str("normal"),
            Self::HIGH => f.write_str("high"),
            Self::VERY_HIGH => f.write_str("very_high"),
            Self::HIGHEST => f.write_str("highest"),
            Self(other) => write!(f, "{other}"),
        }
    }
}

struct PendingItem<T> {
    id: Fingerprint,
    priority: Priority,
    seq: u64,
    value: T,
}

/// Priority-ordered pending sequence.
///
/// Ordering is priority descending, insertion order ascending within a
/// priority (stable FIFO). Front removal is amortized O(1) through a head
/// index; consumed slots are compacted once they exceed a quarter of the
/// backing vector past a minimum length. `update_priority` re-sorts the one
/// affected element and is O(n); it is rare enough not to matter.
pub struct PendingQueue<T> {
    items: Vec<Option<PendingItem<T>>>,
    head: usize,
    next_seq: u64,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            head: 0,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &Fingerprint) -> bool {
        self.position(id).is_some()
    }

    /// Park a value under `id` at `priority`.
    pub fn enqueue(&mut self, id: Fingerprint, priority: Priority, value: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.insert(PendingItem {
            id,
            priority,
            seq,
            value,
        });
    }

    /// Remove and return the front (highest priority, oldest within it).
    pub fn dequeue(&mut self) -> Option<T> {
        while self.head < self.items.len() {
            if let Some(item) = self.items[self.head].take() {
                self.head += 1;
                self.maybe_compact();
                return Some(item.value);
            }
            self.head += 1;
        }
        self.maybe_compact();
        None
    }

    /// Front of the queue without removing it.
    pub fn peek(&self) -> Option<(&Fingerprint, Priority)> {
        self.items[self.head..]
            .iter()
            .flatten()
            .next()
            .map(|item| (&item.id, item.priority))
    }

    /// Remove the entry with the given id, wherever it sits.
    pub fn remove(&mut self, id: &Fingerprint) -> Option<T> {
        let index = self.position(id)?;
        self.items.remove(index).map(|item| item.value)
    }

    /// Re-rank the entry with the given id. Insertion order is preserved for
    /// tie-breaking. Returns false when the id is not parked here.
    pub fn update_priority(&mut self, id: &Fingerprint, priority: Priority) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let Some(mut item) = self.items.remove(index) else {
            return false;
        };
        item.priority = priority;
        self.insert(item);
        true
    }

    fn insert(&mut self, item: PendingItem<T>) {
        let offset = self.items[self.head..].partition_point(|slot| {
            slot.as_ref().is_some_and(|other| {
                other.priority > item.priority
                    || (other.priority == item.priority && other.seq < item.seq)
            })
        });
        self.items.insert(self.head + offset, Some(item));
    }

    fn position(&self, id: &Fingerprint) -> Option<usize> {
        self.items[self.head..]
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|item| &item.id == id))
            .map(|offset| self.head + offset)
    }

    fn maybe_compact(&mut self) {
        let len = self.items.len();
        if len > PENDING_COMPACT_MIN_LEN
            && (self.head as f64) / (len as f64) > PENDING_COMPACT_RATIO
        {
            self.items.drain(..self.head);
            self.head = 0;
        }
    }
}
