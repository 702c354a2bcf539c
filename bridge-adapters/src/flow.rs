//! Host flow definitions.
//!
//! A reconfiguration is persisted by fetching the flow that owns the node,
//! overwriting the node's configuration fields and writing the flow back. The host
//! restarts the flow when it is written.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Uri};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::http_client::{HyperClient, build_https_client};

/// Result alias for flow store operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors raised during the flow round-trip.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The admin endpoint is not a usable URL.
    #[error("invalid admin endpoint: {reason}")]
    InvalidEndpoint {
        /// Additional context.
        reason: String,
    },

    /// Transport-level failure.
    #[error("{reason}")]
    Transport {
        /// Additional context.
        reason: String,
    },

    /// The host answered with a non-success status.
    #[error("{status} {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The flow definition could not be decoded or encoded.
    #[error("invalid flow definition: {reason}")]
    Decode {
        /// Additional context.
        reason: String,
    },

    /// The flow has no `nodes` array.
    #[error("No nodes in flow!")]
    MissingNodes,

    /// The flow does not contain the node.
    #[error("there is no node with such id!")]
    NodeNotFound {
        /// Identifier that was looked up.
        node_id: String,
    },
}

impl FlowError {
    fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Access to the host's flow definitions.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Fetches the definition of `flow_id`.
    async fn fetch_flow(&self, flow_id: &str) -> FlowResult<Value>;

    /// Writes the definition of `flow_id`, restarting it.
    async fn persist_flow(&self, flow_id: &str, flow: &Value) -> FlowResult<()>;
}

/// Copies `fields` into the node `node_id` of a flow definition.
///
/// # Errors
///
/// Returns [`FlowError::MissingNodes`] when the flow has no `nodes` array and
/// [`FlowError::NodeNotFound`] when no node has the identifier.
pub fn apply_node_config(
    flow: &mut Value,
    node_id: &str,
    fields: &Map<String, Value>,
) -> FlowResult<()> {
    let nodes = flow
        .get_mut("nodes")
        .and_then(Value::as_array_mut)
        .ok_or(FlowError::MissingNodes)?;

    let node = nodes
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|node| node.get("id").and_then(Value::as_str) == Some(node_id))
        .ok_or_else(|| FlowError::NodeNotFound {
            node_id: node_id.to_owned(),
        })?;

    for (key, value) in fields {
        node.insert(key.clone(), value.clone());
    }
    Ok(())
}

/// Location of the host's admin API.
#[derive(Clone, Debug)]
pub struct FlowStoreConfig {
    base_url: String,
    timeout: Duration,
}

impl FlowStoreConfig {
    /// Creates a configuration for the supplied admin base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidEndpoint`] if the URL is not http(s).
    pub fn new(base_url: impl AsRef<str>) -> FlowResult<Self> {
        Ok(Self {
            base_url: sanitize_base_url(base_url.as_ref())?,
            timeout: Duration::from_secs(30),
        })
    }

    /// Admin API of a host running on this machine.
    ///
    /// The port defaults to 1880 and `http_admin_root` is appended when set.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidEndpoint`] if the resulting URL is invalid.
    pub fn local(ui_port: Option<u16>, http_admin_root: Option<&str>) -> FlowResult<Self> {
        let mut url = format!("http://localhost:{}", ui_port.unwrap_or(1880));
        if let Some(root) = http_admin_root {
            url.push_str(root);
        }
        Self::new(url)
    }

    /// Sets the timeout applied to each request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the sanitised base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// [`FlowStore`] backed by the host's HTTP admin API.
pub struct HttpFlowStore {
    client: HyperClient,
    config: FlowStoreConfig,
}

impl fmt::Debug for HttpFlowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFlowStore")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpFlowStore {
    /// Creates a store for the supplied admin API.
    #[must_use]
    pub fn new(config: FlowStoreConfig) -> Self {
        Self {
            client: build_https_client(),
            config,
        }
    }

    fn flow_uri(&self, flow_id: &str) -> FlowResult<Uri> {
        format!("{}flow/{flow_id}", self.config.base_url)
            .parse::<Uri>()
            .map_err(|err| FlowError::InvalidEndpoint {
                reason: err.to_string(),
            })
    }

    async fn send(&self, request: Request<Body>) -> FlowResult<Vec<u8>> {
        let response = timeout(self.config.timeout, self.client.request(request))
            .await
            .map_err(|_| FlowError::transport("admin request timed out"))?
            .map_err(|err| FlowError::transport(format!("admin request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| FlowError::transport(format!("failed to read admin response: {err}")))?;

        if !status.is_success() {
            return Err(FlowError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FlowStore for HttpFlowStore {
    async fn fetch_flow(&self, flow_id: &str) -> FlowResult<Value> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.flow_uri(flow_id)?)
            .body(Body::empty())
            .map_err(|err| FlowError::transport(format!("failed to build request: {err}")))?;

        let bytes = self.send(request).await?;
        debug!(flow_id, "flow definition fetched");
        serde_json::from_slice(&bytes).map_err(|err| FlowError::Decode {
            reason: err.to_string(),
        })
    }

    async fn persist_flow(&self, flow_id: &str, flow: &Value) -> FlowResult<()> {
        let body = serde_json::to_vec(flow).map_err(|err| FlowError::Decode {
            reason: err.to_string(),
        })?;
        let request = Request::builder()
            .method(Method::PUT)
            .uri(self.flow_uri(flow_id)?)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|err| FlowError::transport(format!("failed to build request: {err}")))?;

        self.send(request).await?;
        debug!(flow_id, "flow definition persisted");
        Ok(())
    }
}

/// In-process [`FlowStore`] for hosts without an admin API.
#[derive(Debug, Default)]
pub struct MemoryFlowStore {
    flows: Mutex<HashMap<String, Value>>,
}

impl MemoryFlowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flow definition, returning the store for chaining.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn with_flow(self, flow_id: impl Into<String>, flow: Value) -> Self {
        self.flows
            .lock()
            .expect("flow store poisoned")
            .insert(flow_id.into(), flow);
        self
    }

    /// Returns the stored definition of `flow_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn flow(&self, flow_id: &str) -> Option<Value> {
        self.flows.lock().expect("flow store poisoned").get(flow_id).cloned()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn fetch_flow(&self, flow_id: &str) -> FlowResult<Value> {
        self.flow(flow_id).ok_or_else(|| FlowError::Status {
            status: 404,
            body: format!("flow {flow_id} not found"),
        })
    }

    async fn persist_flow(&self, flow_id: &str, flow: &Value) -> FlowResult<()> {
        self.flows
            .lock()
            .map_err(|_| FlowError::transport("flow store poisoned"))?
            .insert(flow_id.to_owned(), flow.clone());
        Ok(())
    }
}

fn sanitize_base_url(input: &str) -> FlowResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(FlowError::InvalidEndpoint {
            reason: "admin URL must start with http:// or https://".to_owned(),
        });
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| FlowError::InvalidEndpoint {
        reason: err.to_string(),
    })?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn flow() -> Value {
        json!({
            "id": "flow-1",
            "nodes": [
                {"id": "other", "type": "inject"},
                {"id": "node-1", "type": "mindconnect", "retry": "3"}
            ]
        })
    }

    #[test]
    fn local_config_builds_admin_url() {
        assert_eq!(
            FlowStoreConfig::local(None, None).unwrap().base_url(),
            "http://localhost:1880/"
        );
        assert_eq!(
            FlowStoreConfig::local(Some(1881), Some("/admin")).unwrap().base_url(),
            "http://localhost:1881/admin/"
        );
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let err = FlowStoreConfig::new("localhost:1880").expect_err("missing scheme");
        assert!(matches!(err, FlowError::InvalidEndpoint { .. }));
    }

    #[test]
    fn flow_uri_appends_flow_id() {
        let store = HttpFlowStore::new(FlowStoreConfig::local(None, None).unwrap());
        assert_eq!(
            store.flow_uri("abc").unwrap().to_string(),
            "http://localhost:1880/flow/abc"
        );
    }

    #[test]
    fn applies_fields_to_matching_node_only() {
        let mut flow = flow();
        let mut fields = Map::new();
        fields.insert("retry".into(), json!("7"));

        apply_node_config(&mut flow, "node-1", &fields).unwrap();
        assert_eq!(flow["nodes"][1]["retry"], json!("7"));
        assert!(flow["nodes"][0].get("retry").is_none());
    }

    #[test]
    fn missing_nodes_or_node_is_an_error() {
        let fields = Map::new();
        let err = apply_node_config(&mut json!({"id": "f"}), "node-1", &fields).unwrap_err();
        assert!(matches!(err, FlowError::MissingNodes));

        let err = apply_node_config(&mut flow(), "node-9", &fields).unwrap_err();
        assert_eq!(err.to_string(), "there is no node with such id!");
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryFlowStore::new().with_flow("flow-1", flow());
        let mut fetched = store.fetch_flow("flow-1").await.unwrap();
        fetched["label"] = json!("updated");
        store.persist_flow("flow-1", &fetched).await.unwrap();

        assert_eq!(store.flow("flow-1").unwrap()["label"], json!("updated"));
        assert!(matches!(
            store.fetch_flow("missing").await,
            Err(FlowError::Status { status: 404, .. })
        ));
    }
}
