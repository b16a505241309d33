//! Recording stub transport for exercising the core without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{
    CourierError, Result, Transport, TransportFailureKind, TransportRequest, TransportResponse,
};

/// Transport that serves scripted responses and records every execution.
pub struct StubTransport {
    default_body: Option<Vec<u8>>,
    by_path: Mutex<HashMap<String, Vec<u8>>>,
    fail: bool,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StubTransport {
    /// Always answer 200 with `body`.
    pub fn returning(body: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            default_body: Some(body.to_vec()),
            by_path: Mutex::new(HashMap::new()),
            fail: false,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Always fail with a connect error.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            default_body: None,
            by_path: Mutex::new(HashMap::new()),
            fail: true,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Builder-style: hold each response for `delay` before answering.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut this = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("stub already shared"));
        this.delay = delay;
        Arc::new(this)
    }

    /// Builder-style: answer requests whose path contains `fragment` with a
    /// dedicated body.
    pub fn with_response_for(self: Arc<Self>, fragment: &str, body: &[u8]) -> Arc<Self> {
        self.by_path
            .lock()
            .unwrap()
            .insert(fragment.to_string(), body.to_vec());
        self
    }

    /// Paths of every executed request, in execution order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of concurrently executing requests observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(CourierError::transport(
                "stub transport refused the connection",
                TransportFailureKind::Connect,
            ));
        }

        let scripted = self
            .by_path
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, body)| body.clone());
        let bytes = scripted
            .or_else(|| self.default_body.clone())
            .ok_or(CourierError::NoResponse)?;

        Ok(TransportResponse { status: 200, bytes })
    }
}
