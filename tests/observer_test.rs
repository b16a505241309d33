//! Observer behavior: stale-then-fresh delivery, the shorter-policy rule,
//! duplicate suppression, and cancellation liveness.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{eventually, fingerprint_of, test_manager, StubTransport, TestDescriptor};
use courier_core::{CachePolicy, ObserverToken};

struct Screen;

/// Expired entry with `return_cached_data_if_expired`: the observer sees the
/// stale value immediately and the refreshed value when the transport lands.
#[tokio::test]
async fn observers_get_stale_then_fresh_values() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":\"fresh\"}");
    let manager = test_manager(dir.path(), transport.clone());

    let descriptor = TestDescriptor::cacheable("stale-fresh", 60);
    manager
        .cache()
        .put(
            fingerprint_of(&descriptor),
            b"{\"ok\":\"stale\"}".to_vec(),
            CachePolicy::ExpireImmediately,
        )
        .await;

    let target = Arc::new(Screen);
    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let mut token: Option<ObserverToken> = None;
    {
        let seen = seen.clone();
        manager
            .observe(&target, descriptor, (), &mut token, move |value| {
                seen.lock().unwrap().push((*value).clone());
            })
            .await;
    }
    assert!(token.is_some());

    eventually(|| seen.lock().unwrap().len() == 2).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], serde_json::json!({"ok": "stale"}));
    assert_eq!(seen[1], serde_json::json!({"ok": "fresh"}));
    assert_eq!(transport.call_count(), 1);
}

/// Opting out of stale delivery surfaces only the refreshed value.
#[tokio::test]
async fn stale_opt_out_suppresses_the_first_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":\"fresh\"}");
    let manager = test_manager(dir.path(), transport.clone());

    let descriptor = TestDescriptor::cacheable("no-stale", 60).rejecting_stale();
    manager
        .cache()
        .put(
            fingerprint_of(&descriptor),
            b"{\"ok\":\"stale\"}".to_vec(),
            CachePolicy::ExpireImmediately,
        )
        .await;

    let target = Arc::new(Screen);
    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let mut token = None;
    {
        let seen = seen.clone();
        manager
            .observe(&target, descriptor, (), &mut token, move |value| {
                seen.lock().unwrap().push((*value).clone());
            })
            .await;
    }

    eventually(|| !seen.lock().unwrap().is_empty()).await;
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![serde_json::json!({"ok": "fresh"})]);
}

/// Shorter-policy rule: a nominally fresh entry is refreshed anyway when the
/// observing descriptor carries a stricter policy.
#[tokio::test]
async fn shorter_policy_forces_a_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":\"fresh\"}");
    let manager = test_manager(dir.path(), transport.clone());

    let descriptor = TestDescriptor::cacheable("shorter", 60);
    manager
        .cache()
        .put(
            fingerprint_of(&descriptor),
            b"{\"ok\":\"hourly\"}".to_vec(),
            CachePolicy::timed(3600).unwrap(),
        )
        .await;

    let target = Arc::new(Screen);
    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let mut token = None;
    {
        let seen = seen.clone();
        manager
            .observe(&target, descriptor, (), &mut token, move |value| {
                seen.lock().unwrap().push((*value).clone());
            })
            .await;
    }

    // The hour-long entry was still delivered (stale path), and the stricter
    // policy triggered a network refresh.
    eventually(|| seen.lock().unwrap().len() == 2).await;
    assert_eq!(transport.call_count(), 1);
    assert_eq!(
        seen.lock().unwrap().last().unwrap(),
        &serde_json::json!({"ok": "fresh"})
    );
}

/// A fresh entry under an equal-or-longer policy does not refresh.
#[tokio::test]
async fn fresh_entries_do_not_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":\"fresh\"}");
    let manager = test_manager(dir.path(), transport.clone());

    let descriptor = TestDescriptor::cacheable("fresh-hold", 3600);
    manager
        .cache()
        .put(
            fingerprint_of(&descriptor),
            b"{\"ok\":\"cached\"}".to_vec(),
            CachePolicy::timed(60).unwrap(),
        )
        .await;

    let target = Arc::new(Screen);
    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let mut token = None;
    {
        let seen = seen.clone();
        manager
            .observe(&target, descriptor, (), &mut token, move |value| {
                seen.lock().unwrap().push((*value).clone());
            })
            .await;
    }

    eventually(|| seen.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.call_count(), 0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![serde_json::json!({"ok": "cached"})]
    );
}

/// Observing twice with a live token for the same request reuses it: one
/// observer entry, one delivery per write.
#[tokio::test]
async fn duplicate_observers_are_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":true}");
    let manager = test_manager(dir.path(), transport.clone());

    let target = Arc::new(Screen);
    let seen = Arc::new(Mutex::new(0usize));
    let mut token: Option<ObserverToken> = None;

    for _ in 0..2 {
        let seen = seen.clone();
        manager
            .observe(
                &target,
                TestDescriptor::cacheable("dupes", 60),
                (),
                &mut token,
                move |_| {
                    *seen.lock().unwrap() += 1;
                },
            )
            .await;
    }
    let token = token.expect("token registered");
    assert!(!token.is_cancelled());

    // Both observes raced the same empty cache; coalescing collapsed the
    // refreshes into one transport call, and the single observer fired once
    // per cache write.
    eventually(|| *seen.lock().unwrap() >= 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock().unwrap(), 1);
    assert_eq!(transport.call_count(), 1);
}

/// Switching the same token slot to a different request cancels the old
/// registration.
#[tokio::test]
async fn retargeting_a_token_cancels_the_previous_observer() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":true}");
    let manager = test_manager(dir.path(), transport.clone());

    let target = Arc::new(Screen);
    let mut token = None;

    manager
        .observe(
            &target,
            TestDescriptor::cacheable("first-target", 60),
            (),
            &mut token,
            |_| {},
        )
        .await;
    let first = token.clone().unwrap();

    manager
        .observe(
            &target,
            TestDescriptor::cacheable("second-target", 60),
            (),
            &mut token,
            |_| {},
        )
        .await;
    let second = token.clone().unwrap();

    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert_ne!(first.fingerprint(), second.fingerprint());
}

/// No callback fires after `cancel()` returns, and cancelling twice is safe.
#[tokio::test]
async fn cancelled_observers_stay_silent() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":true}").with_delay(Duration::from_millis(60));
    let manager = test_manager(dir.path(), transport.clone());

    let target = Arc::new(Screen);
    let seen = Arc::new(Mutex::new(0usize));
    let mut token = None;
    {
        let seen = seen.clone();
        manager
            .observe(
                &target,
                TestDescriptor::cacheable("cancelled", 60),
                (),
                &mut token,
                move |_| {
                    *seen.lock().unwrap() += 1;
                },
            )
            .await;
    }

    // Cancel while the refresh is still in flight.
    let token = token.unwrap();
    token.cancel();
    token.cancel();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*seen.lock().unwrap(), 0);
    // The refresh itself still happened and fed the cache.
    assert_eq!(transport.call_count(), 1);
}
