use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Malformed or inconsistent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting had an unusable value.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidField {
        /// Wire name of the setting.
        field: &'static str,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The credentials or private key were rejected.
    #[error("{reason}")]
    InvalidCredentials {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A configuration document could not be decoded.
    #[error("invalid configuration document: {source}")]
    Decode {
        /// Decoding error reported by `serde_json`.
        #[from]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Convenience constructor for invalid settings.
    #[must_use]
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for credential failures.
    #[must_use]
    pub fn invalid_credentials(reason: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            reason: reason.into(),
        }
    }
}
