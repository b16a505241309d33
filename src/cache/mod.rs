//! # Two-Tier Response Cache
//!
//! Bounded in-memory LRU in front of a bounded on-disk store, keyed by
//! request fingerprint. Reads consult memory first and promote disk hits;
//! writes go through both tiers inside one critical section, so the `Added`
//! change event is emitted exactly once per successful write and a concurrent
//! read can never observe a stale value afterward.
//!
//! The cache stores raw response bytes. It never invokes observer callbacks
//! itself; change events fan out through the observer registry.

mod disk;
mod entry;
mod memory;
mod policy;

pub use entry::CacheEntry;
pub use policy::{CachePolicy, Expiry};

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::config::CourierConfig;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::fingerprint::Fingerprint;

use disk::DiskTier;
use memory::MemoryTier;

/// Change notification emitted by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Added(Fingerprint),
    Removed(Fingerprint),
    RemovedAll,
    RemovedExpired,
}

/// Counters for cache effectiveness monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    disk_failures: AtomicU64,
}

/// Point-in-time view of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub disk_failures: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            disk_failures: self.disk_failures.load(Ordering::Relaxed),
        }
    }
}

/// The two-tier cache façade shared across all queues.
#[derive(Clone)]
pub struct TieredCache {
    tiers: Arc<Mutex<Tiers>>,
    events: broadcast::Sender<CacheEvent>,
    stats: Arc<CacheStats>,
}

struct Tiers {
    memory: MemoryTier,
    disk: DiskTier,
}

impl TieredCache {
    pub(crate) fn new(config: &CourierConfig) -> Self {
        let count_limit = NonZeroUsize::new(config.memory_count_limit)
            .unwrap_or(NonZeroUsize::MIN);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tiers: Arc::new(Mutex::new(Tiers {
                memory: MemoryTier::new(count_limit, config.memory_byte_limit),
                disk: DiskTier::new(config.cache_dir(), config.disk_byte_limit),
            })),
            events,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Raw cached bytes for a fingerprint, if present (expired or not).
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Vec<u8>> {
        self.entry(fingerprint).await.map(|e| e.bytes.clone())
    }

    /// Full entry lookup with disk promotion.
    pub(crate) async fn entry(&self, fingerprint: &Fingerprint) -> Option<Arc<CacheEntry>> {
        let mut tiers = self.tiers.lock().await;
        if let Some(entry) = tiers.memory.get(fingerprint) {
            self.stats.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry);
        }
        if let Some(entry) = tiers.disk.read(fingerprint).await {
            let entry = Arc::new(entry);
            let evicted = tiers.memory.put(entry.clone());
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            self.stats.disk_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write raw bytes under the given policy, through both tiers.
    ///
    /// A disk failure is logged and the memory copy stays authoritative; the
    /// `Added` event fires regardless.
    pub async fn put(&self, fingerprint: Fingerprint, bytes: Vec<u8>, policy: CachePolicy) {
        let entry = Arc::new(CacheEntry::new(fingerprint.clone(), bytes, policy));
        let mut tiers = self.tiers.lock().await;
        let evicted = tiers.memory.put(entry.clone());
        self.stats
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        if let Err(error) = tiers.disk.write(&entry).await {
            self.stats.disk_failures.fetch_add(1, Ordering::Relaxed);
            warn!(fingerprint = %fingerprint, %error, "disk cache write failed, memory copy is authoritative");
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEvent::Added(fingerprint));
    }

    /// Whether the entry under `fingerprint` is expired. Absent entries count
    /// as expired.
    pub async fn is_expired(&self, fingerprint: &Fingerprint) -> bool {
        match self.entry(fingerprint).await {
            Some(entry) => entry.is_expired(SystemTime::now()),
            None => true,
        }
    }

    /// Stored expiry for a fingerprint, if an entry exists.
    pub async fn expiry(&self, fingerprint: &Fingerprint) -> Option<Expiry> {
        let tiers = self.tiers.lock().await;
        if let Some(entry) = tiers.memory.peek(fingerprint) {
            return Some(entry.expiry);
        }
        tiers.disk.read(fingerprint).await.map(|e| e.expiry)
    }

    /// Force-expire an entry while leaving its bytes readable.
    pub async fn expire(&self, fingerprint: &Fingerprint) {
        let expiry = Expiry::At(SystemTime::now());
        let mut tiers = self.tiers.lock().await;
        tiers.memory.set_expiry(fingerprint, expiry);
        if let Some(mut entry) = tiers.disk.read(fingerprint).await {
            entry.expiry = expiry;
            if let Err(error) = tiers.disk.write(&entry).await {
                warn!(fingerprint = %fingerprint, %error, "failed to persist forced expiry");
            }
        }
    }

    /// Remove one entry from both tiers.
    pub async fn remove(&self, fingerprint: &Fingerprint) {
        let mut tiers = self.tiers.lock().await;
        tiers.memory.remove(fingerprint);
        tiers.disk.remove(fingerprint).await;
        self.emit(CacheEvent::Removed(fingerprint.clone()));
    }

    /// Sweep expired entries from both tiers.
    pub async fn remove_expired(&self) {
        let now = SystemTime::now();
        let mut tiers = self.tiers.lock().await;
        for key in tiers.memory.expired_keys(now) {
            tiers.memory.remove(&key);
        }
        tiers.disk.remove_expired(now).await;
        self.emit(CacheEvent::RemovedExpired);
    }

    /// Drop everything, including the on-disk directory.
    pub async fn remove_all(&self) {
        let mut tiers = self.tiers.lock().await;
        tiers.memory.clear();
        tiers.disk.clear().await;
        self.emit(CacheEvent::RemovedAll);
    }

    /// Subscribe to change events. Events are delivered in `put` completion
    /// order; consumers drain serially.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Convenience: run `callback` for every change event on a dedicated task.
    pub fn on_change(&self, callback: impl Fn(CacheEvent) + Send + 'static) {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                callback(event);
            }
        });
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn emit(&self, event: CacheEvent) {
        // Zero subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}
