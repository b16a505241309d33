//! # Configuration
//!
//! Typed configuration for the courier core. All tunables are compile-time
//! defaults (see [`crate::constants`]) overridable through this struct, which
//! is handed to [`crate::CourierManager::new`] at construction.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CACHE_DIR_NAME, DEFAULT_DISK_BYTE_LIMIT, DEFAULT_MEMORY_BYTE_LIMIT,
    DEFAULT_MEMORY_COUNT_LIMIT, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::error::{CourierError, Result};

/// Configuration for a [`crate::CourierManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Maximum number of entries in the memory cache tier.
    pub memory_count_limit: usize,
    /// Byte budget of the memory cache tier.
    pub memory_byte_limit: usize,
    /// Byte budget of the disk cache tier.
    pub disk_byte_limit: u64,
    /// Parent directory for the on-disk cache. The tier itself lives in a
    /// `com.network.cache/` directory underneath. Defaults to the system
    /// temporary directory.
    pub disk_root: Option<PathBuf>,
    /// Concurrency cap used by queues declaring `Concurrency::Default`.
    /// `None` means the platform's available parallelism.
    pub default_queue_concurrency: Option<usize>,
    /// Transport-level request timeout.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for CourierConfig {
    /// Default configuration suitable for production use.
    fn default() -> Self {
        Self {
            memory_count_limit: DEFAULT_MEMORY_COUNT_LIMIT,
            memory_byte_limit: DEFAULT_MEMORY_BYTE_LIMIT,
            disk_byte_limit: DEFAULT_DISK_BYTE_LIMIT,
            disk_root: None,
            default_queue_concurrency: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl CourierConfig {
    /// Test-optimized configuration: tiny bounds, short timeout.
    pub fn for_test() -> Self {
        Self {
            memory_count_limit: 16,
            memory_byte_limit: 1024 * 1024,
            disk_byte_limit: 1024 * 1024,
            disk_root: None,
            default_queue_concurrency: Some(4),
            request_timeout: Duration::from_secs(2),
        }
    }

    /// Validate the configuration before the manager wires anything up.
    pub fn validate(&self) -> Result<()> {
        if self.memory_count_limit == 0 {
            return Err(CourierError::config("memory_count_limit must be positive"));
        }
        if self.memory_byte_limit == 0 {
            return Err(CourierError::config("memory_byte_limit must be positive"));
        }
        if self.disk_byte_limit == 0 {
            return Err(CourierError::config("disk_byte_limit must be positive"));
        }
        if self.default_queue_concurrency == Some(0) {
            return Err(CourierError::config(
                "default_queue_concurrency must be positive when set",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(CourierError::config("request_timeout must be positive"));
        }
        Ok(())
    }

    /// Concurrency cap applied to `Concurrency::Default` queues.
    pub(crate) fn effective_default_concurrency(&self) -> usize {
        self.default_queue_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Full path of the on-disk cache directory.
    pub(crate) fn cache_dir(&self) -> PathBuf {
        self.disk_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_DIR_NAME)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
