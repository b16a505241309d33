//! # courier-core
//!
//! Request coalescing, caching, and scheduling core for declarative
//! client-side networking. Application code declares typed request
//! descriptors; the core fingerprints each invocation, serves from a
//! two-tier cache when policy permits, coalesces identical in-flight
//! requests into one execution, schedules work on concurrency-bounded named
//! queues with mutable priorities, and fans results out to
//! fingerprint-keyed observers on the main dispatcher.

pub mod cache;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod http;
pub mod logging;
pub mod manager;
pub mod observer;
pub mod scheduling;

pub use cache::{CacheEntry, CacheEvent, CachePolicy, CacheStatsSnapshot, Expiry, TieredCache};
pub use config::CourierConfig;
pub use dispatch::{MainDispatcher, MainDispatcherQueue};
pub use error::{CourierError, Result, TransportFailureKind};
pub use events::{LifecycleEvent, LifecycleEventKind, LifecyclePublisher, RequestLifecycle};
pub use fingerprint::Fingerprint;
pub use http::{
    HttpTransport, MergePolicy, Method, RequestParams, Requestable, Transport, TransportRequest,
    TransportResponse, UrlPath,
};
pub use logging::init_logging;
pub use manager::{CourierManager, CourierManagerBuilder};
pub use observer::ObserverToken;
pub use scheduling::{Concurrency, Priority, QueueDef, QueueSnapshot, TaskState};
