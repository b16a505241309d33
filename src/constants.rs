//! # System Constants
//!
//! Compile-time defaults that define the operational boundaries of the
//! courier networking core: cache bounds, queue concurrency, timeouts, and
//! the lifecycle event names published by the manager.

/// Default maximum number of entries held by the memory cache tier.
pub const DEFAULT_MEMORY_COUNT_LIMIT: usize = 100;

/// Default byte budget for the memory cache tier (100 MB).
pub const DEFAULT_MEMORY_BYTE_LIMIT: usize = 100 * 1024 * 1024;

/// Default byte budget for the disk cache tier (100 MB).
pub const DEFAULT_DISK_BYTE_LIMIT: u64 = 100 * 1024 * 1024;

/// Directory name of the on-disk cache tier.
///
/// The directory layout (one file per fingerprint) is externally observable;
/// the file format inside it is not.
pub const CACHE_DIR_NAME: &str = "com.network.cache";

/// Default transport-level request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 100;

/// Name of the queue definition descriptors use unless they declare their own.
pub const DEFAULT_QUEUE_NAME: &str = "network.default";

/// Pending-queue compaction: compact once the consumed prefix exceeds this
/// share of the backing vector.
pub const PENDING_COMPACT_RATIO: f64 = 0.25;

/// Pending-queue compaction: never compact below this backing length.
pub const PENDING_COMPACT_MIN_LEN: usize = 50;

/// Capacity of the broadcast channels carrying cache change and request
/// lifecycle events. Subscribers lagging past this lose events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Request lifecycle events published by the manager.
pub mod events {
    pub const REQUEST_STARTED: &str = "request.started";
    pub const REQUEST_COMPLETED: &str = "request.completed";
    pub const REQUEST_FAILED: &str = "request.failed";
}
