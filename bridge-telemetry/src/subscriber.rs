//! Subscriber installation.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {reason}")]
    Subscriber {
        /// Reason reported by `tracing-subscriber`.
        reason: String,
    },
}

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` when the variable is unset or invalid.
///
/// # Errors
///
/// Returns [`TelemetryError::Subscriber`] when a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| TelemetryError::Subscriber {
            reason: err.to_string(),
        })
}
