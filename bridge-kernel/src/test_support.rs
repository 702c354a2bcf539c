use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_adapters::traits::{
    AgentCapability, AgentError, AgentProvider, AgentResult, FileUploadRequest,
};
use bridge_config::{AgentCredentials, AgentSettings, AgentSettingsBuilder};
use bridge_primitives::{BulkEntry, DataPoint, Event, FileSource};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

pub(crate) const CLIENT_ID: &str = "d72262e71ea0470eb9f880176b888938";

pub(crate) fn credentials() -> AgentCredentials {
    serde_json::from_value(json!({
        "content": {
            "baseUrl": "https://southgate.eu1.mindsphere.io",
            "iat": "token",
            "clientCredentialProfile": ["SHARED_SECRET"],
            "clientId": CLIENT_ID,
            "tenant": "castidev"
        },
        "expiration": "2030-01-01T00:00:00.000Z"
    }))
    .expect("credentials")
}

pub(crate) fn settings() -> AgentSettingsBuilder {
    AgentSettings::builder(credentials()).name("test-node")
}

pub(crate) fn reconfiguration_payload() -> Value {
    json!({
        "name": "reconfigured",
        "configtype": "SHARED_SECRET",
        "agentconfig": {
            "content": {
                "baseUrl": "https://southgate.eu1.mindsphere.io",
                "iat": "token",
                "clientCredentialProfile": ["SHARED_SECRET"],
                "clientId": "0123456789abcdef0123456789abcdef",
                "tenant": "castidev"
            },
            "expiration": "2030-01-01T00:00:00.000Z"
        },
        "privatekey": "",
        "model": "",
        "validate": true,
        "validateevent": false,
        "chunk": false,
        "disablekeepalive": false,
        "retry": "4",
        "parallel": "2",
        "asyncduration": "5"
    })
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub(crate) struct MockAgent {
    pub(crate) onboarded: AtomicBool,
    pub(crate) configured: AtomicBool,
    pub(crate) onboard_calls: AtomicUsize,
    pub(crate) config_calls: AtomicUsize,
    pub(crate) renew_calls: AtomicUsize,
    pub(crate) post_calls: AtomicUsize,
    pub(crate) bulk_calls: AtomicUsize,
    pub(crate) event_calls: AtomicUsize,
    pub(crate) put_calls: AtomicUsize,
    pub(crate) failing_onboards: AtomicUsize,
    pub(crate) failing_posts: AtomicUsize,
    pub(crate) failing_renewals: AtomicUsize,
    pub(crate) failing_puts: AtomicUsize,
    pub(crate) reject_events: AtomicBool,
    pub(crate) uploads: Mutex<Vec<FileUploadRequest>>,
    pub(crate) events: Mutex<Vec<Event>>,
    pub(crate) custom_events: Mutex<Vec<Map<String, Value>>>,
    pub(crate) url_paths: Mutex<Vec<String>>,
    pub(crate) sub_tenants: Mutex<Vec<Option<String>>>,
    pub(crate) put_urls: Mutex<Vec<String>>,
}

impl MockAgent {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn ready() -> Arc<Self> {
        let agent = Self::default();
        agent.onboarded.store(true, Ordering::SeqCst);
        agent.configured.store(true, Ordering::SeqCst);
        Arc::new(agent)
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentCapability for MockAgent {
    fn client_id(&self) -> String {
        CLIENT_ID.to_owned()
    }

    fn is_onboarded(&self) -> bool {
        self.onboarded.load(Ordering::SeqCst)
    }

    fn has_data_source_configuration(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn onboard(&self) -> AgentResult<()> {
        self.onboard_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.failing_onboards) {
            return Err(AgentError::transport("gateway unreachable"));
        }
        self.onboarded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn renew_token(&self) -> AgentResult<()> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.failing_renewals) {
            return Err(AgentError::rejected("token rotation refused"));
        }
        Ok(())
    }

    async fn data_source_configuration(&self) -> AgentResult<Value> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        self.configured.store(true, Ordering::SeqCst);
        Ok(json!({"configurationId": "cfg-1"}))
    }

    async fn data_mappings(&self) -> AgentResult<Value> {
        Ok(json!([{"dataPointId": "1"}]))
    }

    async fn post_data(
        &self,
        _points: &[DataPoint],
        _timestamp: DateTime<Utc>,
        _validate: bool,
    ) -> AgentResult<()> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.failing_posts) {
            return Err(AgentError::transport("connection reset"));
        }
        Ok(())
    }

    async fn bulk_post_data(&self, _entries: &[BulkEntry], _validate: bool) -> AgentResult<()> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_event(
        &self,
        event: &Event,
        _timestamp: DateTime<Utc>,
        _validate: bool,
    ) -> AgentResult<bool> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().expect("events").push(event.clone());
        Ok(!self.reject_events.load(Ordering::SeqCst))
    }

    async fn post_custom_event(
        &self,
        event: &Map<String, Value>,
        _timestamp: DateTime<Utc>,
        _validate: bool,
    ) -> AgentResult<bool> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.custom_events.lock().expect("events").push(event.clone());
        Ok(!self.reject_events.load(Ordering::SeqCst))
    }

    async fn upload_file(&self, request: FileUploadRequest) -> AgentResult<()> {
        self.uploads.lock().expect("uploads").push(request);
        Ok(())
    }

    async fn generate_upload_url(
        &self,
        path: &str,
        sub_tenant_id: Option<&str>,
    ) -> AgentResult<String> {
        self.url_paths.lock().expect("paths").push(path.to_owned());
        self.sub_tenants
            .lock()
            .expect("sub tenants")
            .push(sub_tenant_id.map(str::to_owned));
        Ok(format!("https://upload.example.com{path}?signature=abc"))
    }

    async fn put_file(&self, _source: &FileSource, signed_url: &str) -> AgentResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.put_urls.lock().expect("put urls").push(signed_url.to_owned());
        if take(&self.failing_puts) {
            return Err(AgentError::transport("upload interrupted"));
        }
        Ok(())
    }

    async fn get_asset(&self, asset_id: &str, include_shared: bool) -> AgentResult<Value> {
        Ok(json!({
            "assetId": asset_id,
            "name": "Pump 7",
            "typeId": "castidev.Pump",
            "shared": include_shared,
        }))
    }

    async fn access_token(&self) -> AgentResult<String> {
        Ok("access-token".to_owned())
    }
}

pub(crate) struct MockProvider {
    pub(crate) agent: Arc<MockAgent>,
    pub(crate) builds: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn new(agent: Arc<MockAgent>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            builds: AtomicUsize::new(0),
        })
    }
}

impl AgentProvider for MockProvider {
    fn build(&self, _settings: &AgentSettings) -> AgentResult<Arc<dyn AgentCapability>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.agent.clone())
    }
}
