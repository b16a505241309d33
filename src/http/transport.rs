//! # Transport Seam
//!
//! The HTTP client behind a trait, so the scheduling and caching core can be
//! exercised against recording stubs while production traffic goes through a
//! shared `reqwest` client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{CourierError, Result};
use crate::http::Method;

/// One fully composed HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: reqwest::Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// Raw transport response: status and undecoded body bytes.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes composed requests. Implementations decide nothing about caching
/// or coalescing; they move bytes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Production transport over a shared `reqwest::Client`.
///
/// The client performs no HTTP-level caching of its own (the core caches at
/// descriptor level) and applies the configured timeout to every request.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("courier-core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CourierError::invalid_url(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CourierError::invalid_url(format!("header value: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, bytes })
    }
}
