//! Cache entry data model.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::cache::policy::{CachePolicy, Expiry};
use crate::fingerprint::Fingerprint;

/// One cached response body.
///
/// `bytes` is the raw response body, not the decoded object; decoding is the
/// consumer's responsibility at read time, which decouples the cache from
/// response-type evolution. The same envelope is what the disk tier persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub bytes: Vec<u8>,
    pub written_at: SystemTime,
    pub expiry: Expiry,
}

impl CacheEntry {
    /// Build an entry written now under the given policy.
    pub fn new(fingerprint: Fingerprint, bytes: Vec<u8>, policy: CachePolicy) -> Self {
        let written_at = SystemTime::now();
        Self {
            expiry: policy.deadline(written_at),
            fingerprint,
            bytes,
            written_at,
        }
    }

    /// Whether the entry counts as expired at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiry.is_elapsed(now)
    }

    /// Approximate in-memory footprint, used for tier byte accounting.
    pub(crate) fn weight(&self) -> usize {
        self.bytes.len() + self.fingerprint.rendered().len() + std::mem::size_of::<Self>()
    }
}
