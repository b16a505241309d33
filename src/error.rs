//! # Error Types
//!
//! Unified error handling for the courier networking core. Every failure the
//! core can surface (URL composition, transport, response handling,
//! decoding, cache I/O, coalescing) is a variant of [`CourierError`].
//!
//! All variants are `Clone`: a single failure on a coalesced task fans out to
//! every merged callback, each receiving its own copy of the error.

use thiserror::Error;

/// Core operation result type.
pub type Result<T> = std::result::Result<T, CourierError>;

/// How a transport-level failure presented itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    /// The request timed out.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The server answered with an error status surfaced by the transport.
    Status(u16),
    /// Anything else the HTTP client reported.
    Other,
}

/// Comprehensive error types for courier operations.
#[derive(Debug, Clone, Error)]
pub enum CourierError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("transport returned neither response nor data")]
    NoResponse,

    #[error("transport error: {message}")]
    Transport {
        message: String,
        kind: TransportFailureKind,
    },

    #[error("response decoding failed: {0}")]
    Decode(String),

    #[error("cached bytes no longer decode: {0}")]
    CacheDecode(String),

    #[error("cache I/O error: {0}")]
    CacheIo(String),

    #[error("tasks cannot be coalesced: {0}")]
    MergeIncompatible(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CourierError {
    /// Create an invalid-URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// Create a transport error with an explicit failure kind.
    pub fn transport(message: impl Into<String>, kind: TransportFailureKind) -> Self {
        Self::Transport {
            message: message.into(),
            kind,
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a cache-decode error for stale bytes the consumer can no longer read.
    pub fn cache_decode(message: impl Into<String>) -> Self {
        Self::CacheDecode(message.into())
    }

    /// Create a cache I/O error.
    pub fn cache_io(message: impl Into<String>) -> Self {
        Self::CacheIo(message.into())
    }

    /// Create a merge-incompatibility error.
    pub fn merge_incompatible(message: impl Into<String>) -> Self {
        Self::MergeIncompatible(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the error is worth retrying from the caller's side.
    ///
    /// The core itself never retries; this classification is advisory for
    /// consumers deciding whether to re-issue a request.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            CourierError::Transport { kind, .. } => matches!(
                kind,
                TransportFailureKind::Timeout
                    | TransportFailureKind::Connect
                    | TransportFailureKind::Status(500..)
            ),
            CourierError::NoResponse => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CourierError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportFailureKind::Timeout
        } else if error.is_connect() {
            TransportFailureKind::Connect
        } else if let Some(status) = error.status() {
            TransportFailureKind::Status(status.as_u16())
        } else {
            TransportFailureKind::Other
        };
        Self::Transport {
            message: error.to_string(),
            kind,
        }
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<std::io::Error> for CourierError {
    fn from(error: std::io::Error) -> Self {
        Self::CacheIo(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_classification() {
        let timeout = CourierError::transport("timed out", TransportFailureKind::Timeout);
        assert!(timeout.is_recoverable());

        let server = CourierError::transport("upstream died", TransportFailureKind::Status(503));
        assert!(server.is_recoverable());

        let client = CourierError::transport("not found", TransportFailureKind::Status(404));
        assert!(!client.is_recoverable());

        assert!(!CourierError::decode("bad json").is_recoverable());
        assert!(!CourierError::invalid_url("no host").is_recoverable());
    }

    #[test]
    fn errors_clone_for_fanout() {
        let e = CourierError::decode("unexpected token");
        let copies = [e.clone(), e.clone(), e];
        assert!(copies
            .iter()
            .all(|c| matches!(c, CourierError::Decode(m) if m == "unexpected token")));
    }
}
