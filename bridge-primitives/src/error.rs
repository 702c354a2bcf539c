//! Shared error definitions for bridge primitives.

use thiserror::Error;

/// Result alias used throughout the bridge.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity identifier failed validation.
    #[error("invalid entity id `{id}`: {reason}")]
    InvalidEntityId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// The message payload did not have the expected shape.
    #[error("invalid payload: {source}")]
    InvalidPayload {
        /// Decoding error reported by `serde_json`.
        #[from]
        source: serde_json::Error,
    },

    /// The `_time` override could not be interpreted as an instant.
    #[error("The time stamp in msg._time must be a valid ISO 8601 instant and not {value}.")]
    InvalidTimestamp {
        /// Rendered form of the rejected value.
        value: String,
    },
}
