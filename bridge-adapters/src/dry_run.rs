//! Agent that logs every call instead of contacting the backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bridge_config::AgentSettings;
use bridge_primitives::{BulkEntry, DataPoint, Event, FileSource};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::traits::{AgentCapability, AgentProvider, AgentResult, FileUploadRequest};

/// Agent for local runs; every call succeeds after being logged.
#[derive(Debug)]
pub struct DryRunAgent {
    client_id: String,
    onboarded: AtomicBool,
    configured: AtomicBool,
    calls: AtomicUsize,
}

impl DryRunAgent {
    /// Creates an agent reporting `client_id`.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            onboarded: AtomicBool::new(false),
            configured: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of backend calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: &str) {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        info!(client_id = %self.client_id, call, count, "dry-run backend call");
    }
}

#[async_trait]
impl AgentCapability for DryRunAgent {
    fn client_id(&self) -> String {
        self.client_id.clone()
    }

    fn is_onboarded(&self) -> bool {
        self.onboarded.load(Ordering::SeqCst)
    }

    fn has_data_source_configuration(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn onboard(&self) -> AgentResult<()> {
        self.record("onboard");
        self.onboarded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn renew_token(&self) -> AgentResult<()> {
        self.record("renew_token");
        Ok(())
    }

    async fn data_source_configuration(&self) -> AgentResult<Value> {
        self.record("data_source_configuration");
        self.configured.store(true, Ordering::SeqCst);
        Ok(json!({"name": format!("{}-configuration", self.client_id), "dataSources": []}))
    }

    async fn data_mappings(&self) -> AgentResult<Value> {
        self.record("data_mappings");
        Ok(json!([]))
    }

    async fn post_data(
        &self,
        points: &[DataPoint],
        timestamp: DateTime<Utc>,
        _validate: bool,
    ) -> AgentResult<()> {
        self.record("post_data");
        info!(points = points.len(), %timestamp, "dry-run time series");
        Ok(())
    }

    async fn bulk_post_data(&self, entries: &[BulkEntry], _validate: bool) -> AgentResult<()> {
        self.record("bulk_post_data");
        info!(entries = entries.len(), "dry-run bulk time series");
        Ok(())
    }

    async fn post_event(
        &self,
        event: &Event,
        timestamp: DateTime<Utc>,
        _validate: bool,
    ) -> AgentResult<bool> {
        self.record("post_event");
        info!(source = %event.source, %timestamp, "dry-run event");
        Ok(true)
    }

    async fn post_custom_event(
        &self,
        event: &Map<String, Value>,
        timestamp: DateTime<Utc>,
        _validate: bool,
    ) -> AgentResult<bool> {
        self.record("post_custom_event");
        info!(type_id = ?event.get("typeId"), %timestamp, "dry-run custom event");
        Ok(true)
    }

    async fn upload_file(&self, request: FileUploadRequest) -> AgentResult<()> {
        self.record("upload_file");
        info!(
            entity_id = %request.entity_id,
            file_path = %request.file_path,
            chunk = request.chunk,
            "dry-run file upload"
        );
        Ok(())
    }

    async fn generate_upload_url(
        &self,
        path: &str,
        _sub_tenant_id: Option<&str>,
    ) -> AgentResult<String> {
        self.record("generate_upload_url");
        Ok(format!("dry-run://{}", path.trim_start_matches('/')))
    }

    async fn put_file(&self, source: &FileSource, signed_url: &str) -> AgentResult<()> {
        self.record("put_file");
        info!(source = source.describe(), signed_url, "dry-run data lake upload");
        Ok(())
    }

    async fn get_asset(&self, asset_id: &str, include_shared: bool) -> AgentResult<Value> {
        self.record("get_asset");
        Ok(json!({
            "assetId": asset_id,
            "name": format!("asset-{asset_id}"),
            "sharing": {"shared": include_shared},
        }))
    }

    async fn access_token(&self) -> AgentResult<String> {
        self.record("access_token");
        Ok("dry-run-token".to_owned())
    }
}

/// Builds a [`DryRunAgent`] for the client of the supplied settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunProvider;

impl AgentProvider for DryRunProvider {
    fn build(&self, settings: &AgentSettings) -> AgentResult<Arc<dyn AgentCapability>> {
        Ok(Arc::new(DryRunAgent::new(settings.credentials().client_id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prerequisites_flip_flags() {
        let agent = DryRunAgent::new("client");
        assert!(!agent.is_onboarded());
        agent.onboard().await.unwrap();
        agent.data_source_configuration().await.unwrap();

        assert!(agent.is_onboarded());
        assert!(agent.has_data_source_configuration());
        assert_eq!(agent.calls(), 2);
    }

    #[tokio::test]
    async fn upload_url_is_derived_from_path() {
        let agent = DryRunAgent::new("client");
        let url = agent
            .generate_upload_url("/client/folder/file.txt", None)
            .await
            .unwrap();
        assert_eq!(url, "dry-run://client/folder/file.txt");
    }
}
