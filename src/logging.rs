//! # Structured Logging
//!
//! Environment-aware structured logging bootstrap for consumers that do not
//! install their own `tracing` subscriber. Library code only ever emits
//! through the `tracing` macros; installing a subscriber is the host
//! application's call, and this helper is merely the convenient default.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging with an environment-derived filter.
///
/// Reads `RUST_LOG` when set, defaulting to `courier_core=info`. Safe to call
/// repeatedly (tests, embedded usage); only the first call installs anything,
/// and an already-installed global subscriber is left in place.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("courier_core=info"));

        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter);

        // Another subscriber may already be installed by the host; that one wins.
        let _ = subscriber.try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging();
        init_logging();
    }
}
