//! Disk cache tier.
//!
//! One bincode-envelope file per fingerprint inside `com.network.cache/`.
//! The tier is byte-bounded; when over budget, expired entries are evicted
//! first, then least-recently-modified ones. Entries survive process
//! restarts: reads go straight to the file system, no in-memory index.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, warn};

use crate::cache::entry::CacheEntry;
use crate::error::{CourierError, Result};
use crate::fingerprint::Fingerprint;

pub(crate) struct DiskTier {
    root: PathBuf,
    byte_limit: u64,
}

impl DiskTier {
    pub fn new(root: PathBuf, byte_limit: u64) -> Self {
        Self { root, byte_limit }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.storage_key())
    }

    /// Read one entry. A missing file is a miss; a corrupt file is deleted
    /// and reported as a miss.
    pub async fn read(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let path = self.entry_path(fingerprint);
        let bytes = fs::read(&path).await.ok()?;
        match bincode::deserialize::<CacheEntry>(&bytes) {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(fingerprint = %fingerprint, %error, "corrupt disk cache entry, discarding");
                let _ = fs::remove_file(&path).await;
                None
            }
        }
    }

    /// Persist one entry, then bring the tier back under its byte budget.
    pub async fn write(&self, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        let encoded = bincode::serialize(entry)
            .map_err(|e| CourierError::cache_io(format!("encoding cache entry: {e}")))?;
        fs::write(self.entry_path(&entry.fingerprint), encoded).await?;
        self.enforce_budget(&entry.fingerprint).await;
        Ok(())
    }

    pub async fn remove(&self, fingerprint: &Fingerprint) {
        let _ = fs::remove_file(self.entry_path(fingerprint)).await;
    }

    pub async fn clear(&self) {
        let _ = fs::remove_dir_all(&self.root).await;
    }

    /// Delete every expired entry. Returns how many were removed.
    pub async fn remove_expired(&self, now: SystemTime) -> usize {
        let mut removed = 0;
        for (path, entry) in self.scan_entries().await {
            if entry.is_expired(now) {
                let _ = fs::remove_file(&path).await;
                removed += 1;
            }
        }
        removed
    }

    /// Evict until total size fits the budget: expired entries first, then
    /// least-recently-modified. The entry just written is never evicted.
    async fn enforce_budget(&self, just_written: &Fingerprint) {
        let files = self.scan_files().await;
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        if total <= self.byte_limit {
            return;
        }

        let now = SystemTime::now();
        let keep = self.entry_path(just_written);

        // Expired-first ordering, LRU (oldest mtime) within each class.
        let mut ranked: Vec<(bool, SystemTime, usize)> = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            if file.path == keep {
                continue;
            }
            let expired = match self.read_envelope(&file.path).await {
                Some(entry) => entry.is_expired(now),
                // Unreadable envelopes go first with the expired class.
                None => true,
            };
            ranked.push((expired, file.modified, index));
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, _, index) in ranked {
            if total <= self.byte_limit {
                break;
            }
            let file = &files[index];
            if fs::remove_file(&file.path).await.is_ok() {
                debug!(path = %file.path.display(), "evicted disk cache entry");
                total = total.saturating_sub(file.size);
            }
        }
    }

    async fn read_envelope(&self, path: &Path) -> Option<CacheEntry> {
        let bytes = fs::read(path).await.ok()?;
        bincode::deserialize(&bytes).ok()
    }

    async fn scan_files(&self) -> Vec<DiskFile> {
        let mut files = Vec::new();
        let Ok(mut dir) = fs::read_dir(&self.root).await else {
            return files;
        };
        while let Ok(Some(item)) = dir.next_entry().await {
            let Ok(metadata) = item.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(DiskFile {
                path: item.path(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        files
    }

    async fn scan_entries(&self) -> Vec<(PathBuf, CacheEntry)> {
        let mut entries = Vec::new();
        for file in self.scan_files().await {
            if let Some(entry) = self.read_envelope(&file.path).await {
                entries.push((file.path, entry));
            }
        }
        entries
    }
}

struct DiskFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}
