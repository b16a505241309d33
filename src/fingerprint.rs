//! # Request Fingerprints
//!
//! A fingerprint deterministically identifies a `(method, URL, parameters)`
//! triple. It is the primary key across the cache, the observer registry, and
//! the in-flight task set: two invocations with identical inputs always
//! produce identical fingerprints, regardless of process, ordering, or clock.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::http::Method;

/// Deterministic identifier for one request shape.
///
/// Equality and hashing are byte-equality over the digest. The rendered form
/// (`<url>#<digest-hex>`) exists for logs and diagnostics.
#[derive(Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    digest: String,
    rendered: String,
}

impl Fingerprint {
    /// Compute the fingerprint of `(method, url, params)`.
    ///
    /// Parameters are serialized to canonical JSON (object keys sorted) and
    /// digested with SHA-256 together with the method and absolute URL. If
    /// parameter serialization fails, a 64-bit FNV-1a structural hash over the
    /// parameter's `Hash` implementation is used instead so fingerprint
    /// generation never aborts; the degradation is logged.
    pub fn compute<P: Serialize + Hash>(method: Method, url: &str, params: &P) -> Self {
        let digest = match serde_json::to_vec(params) {
            Ok(canonical) => {
                let mut hasher = Sha256::new();
                hasher.update(method.as_str().as_bytes());
                hasher.update(b"\n");
                hasher.update(url.as_bytes());
                hasher.update(b"\n");
                hasher.update(&canonical);
                hex::encode(hasher.finalize())
            }
            Err(error) => {
                warn!(
                    url,
                    %error,
                    "parameter serialization failed, falling back to structural hash"
                );
                let mut hasher = Fnv64::default();
                method.as_str().hash(&mut hasher);
                url.hash(&mut hasher);
                params.hash(&mut hasher);
                format!("h64-{:016x}", hasher.finish())
            }
        };
        let rendered = format!("{url}#{digest}");
        Self { digest, rendered }
    }

    /// Digest portion: lowercase hex, safe for use as a file name.
    pub fn storage_key(&self) -> &str {
        &self.digest
    }

    /// Log-friendly rendering, URL first.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint").field(&self.rendered).finish()
    }
}

/// FNV-1a, 64 bit. Stable across processes, unlike the std default hasher;
/// only used as the documented fallback when canonical JSON is unavailable.
struct Fnv64(u64);

impl Default for Fnv64 {
    fn default() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }
}

impl Hasher for Fnv64 {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
}
