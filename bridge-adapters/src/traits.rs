//! Backend agent capability.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_config::AgentSettings;
use bridge_primitives::{BulkEntry, DataPoint, Event, FileSource};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result alias used by agent capabilities.
pub type AgentResult<T> = Result<T, AgentError>;

/// Error type shared by agent implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Agent is misconfigured or missing credentials.
    #[error("agent not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The request was rejected before it reached the backend.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be sent.
        reason: String,
    },

    /// Transport-level failures (network, TLS, timeouts).
    #[error("transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The backend answered with an error.
    #[error("backend rejected the request: {reason}")]
    Rejected {
        /// Backend response describing the failure.
        reason: String,
    },
}

impl AgentError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for backend rejections.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Parameters of a file upload to an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUploadRequest {
    /// Target entity.
    pub entity_id: String,
    /// Remote file path.
    pub file_path: String,
    /// Content to upload.
    pub source: FileSource,
    /// MIME type.
    pub file_type: Option<String>,
    /// Upload in chunks.
    pub chunk: bool,
    /// Concurrent chunk uploads.
    pub parallel_uploads: usize,
    /// Attempts per chunk.
    pub retry: u32,
}

/// Authenticated connection to the ingestion backend.
///
/// Implementations own the live access token and use interior mutability; the
/// engine shares one instance between concurrently running operations.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Client identifier of the agent.
    fn client_id(&self) -> String;

    /// Returns `true` once onboarding completed.
    fn is_onboarded(&self) -> bool;

    /// Returns `true` once the data source configuration was fetched.
    fn has_data_source_configuration(&self) -> bool;

    /// Registers the agent with the backend.
    async fn onboard(&self) -> AgentResult<()>;

    /// Rotates the agent access token.
    async fn renew_token(&self) -> AgentResult<()>;

    /// Fetches and caches the data source configuration.
    async fn data_source_configuration(&self) -> AgentResult<Value>;

    /// Fetches the data mappings of the agent.
    async fn data_mappings(&self) -> AgentResult<Value>;

    /// Posts time series values.
    async fn post_data(
        &self,
        points: &[DataPoint],
        timestamp: DateTime<Utc>,
        validate: bool,
    ) -> AgentResult<()>;

    /// Posts timestamped value sets.
    async fn bulk_post_data(&self, entries: &[BulkEntry], validate: bool) -> AgentResult<()>;

    /// Posts an event; returns whether the backend accepted it.
    async fn post_event(
        &self,
        event: &Event,
        timestamp: DateTime<Utc>,
        validate: bool,
    ) -> AgentResult<bool>;

    /// Posts a tenant-defined event object unchanged; returns whether the backend
    /// accepted it.
    async fn post_custom_event(
        &self,
        event: &Map<String, Value>,
        timestamp: DateTime<Utc>,
        validate: bool,
    ) -> AgentResult<bool>;

    /// Uploads a file to an asset.
    async fn upload_file(&self, request: FileUploadRequest) -> AgentResult<()>;

    /// Generates a signed data lake upload URL for `path`.
    async fn generate_upload_url(
        &self,
        path: &str,
        sub_tenant_id: Option<&str>,
    ) -> AgentResult<String>;

    /// Uploads content to a signed URL.
    async fn put_file(&self, source: &FileSource, signed_url: &str) -> AgentResult<()>;

    /// Reads an asset.
    async fn get_asset(&self, asset_id: &str, include_shared: bool) -> AgentResult<Value>;

    /// Returns the current access token.
    async fn access_token(&self) -> AgentResult<String>;
}

/// Builds agent capabilities from settings.
pub trait AgentProvider: Send + Sync {
    /// Creates an agent for the supplied settings.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] when the settings cannot be turned into
    /// a working agent.
    fn build(&self, settings: &AgentSettings) -> AgentResult<Arc<dyn AgentCapability>>;
}
