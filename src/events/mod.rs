//! Event distribution: per-task multicast delegates and the process-wide
//! request lifecycle publisher.

pub mod lifecycle;
pub mod multicast;

pub use lifecycle::{LifecycleEvent, LifecycleEventKind, LifecyclePublisher, RequestLifecycle};
pub use multicast::Multicast;
