//! Memory cache tier: LRU over `Arc`'d entries, bounded by entry count and a
//! byte budget.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;

use crate::cache::entry::CacheEntry;
use crate::cache::policy::Expiry;
use crate::fingerprint::Fingerprint;

pub(crate) struct MemoryTier {
    // Unbounded LRU; both limits are enforced manually so evicted entries can
    // be surfaced for byte accounting and statistics.
    entries: LruCache<Fingerprint, Arc<CacheEntry>>,
    count_limit: NonZeroUsize,
    byte_limit: usize,
    bytes_used: usize,
}

impl MemoryTier {
    pub fn new(count_limit: NonZeroUsize, byte_limit: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            count_limit,
            byte_limit,
            bytes_used: 0,
        }
    }

    /// Look up and touch an entry.
    pub fn get(&mut self, fingerprint: &Fingerprint) -> Option<Arc<CacheEntry>> {
        self.entries.get(fingerprint).cloned()
    }

    /// Look up without disturbing recency, for expiry queries.
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<&Arc<CacheEntry>> {
        self.entries.peek(fingerprint)
    }

    /// Insert or replace, then enforce both bounds. Returns the number of
    /// entries evicted to make room.
    pub fn put(&mut self, entry: Arc<CacheEntry>) -> usize {
        let key = entry.fingerprint.clone();
        self.bytes_used += entry.weight();
        if let Some(previous) = self.entries.put(key, entry) {
            self.bytes_used = self.bytes_used.saturating_sub(previous.weight());
        }

        let mut evicted = 0;
        while self.entries.len() > self.count_limit.get()
            || (self.bytes_used > self.byte_limit && self.entries.len() > 1)
        {
            match self.entries.pop_lru() {
                Some((_, dropped)) => {
                    self.bytes_used = self.bytes_used.saturating_sub(dropped.weight());
                    evicted += 1;
                }
                None => break,
            }
        }
        // An entry larger than the whole budget cannot be held at all.
        if self.bytes_used > self.byte_limit {
            if let Some((_, dropped)) = self.entries.pop_lru() {
                self.bytes_used = self.bytes_used.saturating_sub(dropped.weight());
                evicted += 1;
            }
        }
        evicted
    }

    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<Arc<CacheEntry>> {
        let removed = self.entries.pop(fingerprint);
        if let Some(entry) = &removed {
            self.bytes_used = self.bytes_used.saturating_sub(entry.weight());
        }
        removed
    }

    /// Replace an entry's expiry in place.
    pub fn set_expiry(&mut self, fingerprint: &Fingerprint, expiry: Expiry) -> bool {
        match self.entries.peek_mut(fingerprint) {
            Some(slot) => {
                let mut entry = (**slot).clone();
                entry.expiry = expiry;
                *slot = Arc::new(entry);
                true
            }
            None => false,
        }
    }

    pub fn expired_keys(&self, now: SystemTime) -> Vec<Fingerprint> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes_used = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }
}
