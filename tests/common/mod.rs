//! Shared helpers for integration tests: recording stub transports, test
//! descriptors, and manager construction.
#![allow(dead_code)]

pub mod descriptors;
pub mod stub_transport;

pub use descriptors::*;
pub use stub_transport::*;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use courier_core::{CourierConfig, CourierManager, Transport};

/// Manager with tiny test bounds, an isolated disk root, and the given
/// transport.
pub fn test_manager(dir: &Path, transport: Arc<dyn Transport>) -> CourierManager {
    let config = CourierConfig {
        disk_root: Some(dir.to_path_buf()),
        ..CourierConfig::for_test()
    };
    CourierManager::builder(config)
        .transport(transport)
        .build()
        .expect("manager construction")
}

/// Poll until `check` passes or two seconds elapse.
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if check() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
