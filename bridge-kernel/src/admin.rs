//! Read-only queries served to the host's admin surface.

use std::fmt;
use std::sync::Arc;

use bridge_adapters::traits::{AgentCapability, AgentError, AgentResult};
use bridge_telemetry::{NodeStatus, StatusReporter};
use serde_json::{Value, json};
use tracing::warn;

/// Status and asset lookups for one node.
///
/// Queries never fail: errors are returned as `{ "error": ... }` and reported as a
/// red status.
#[derive(Clone)]
pub struct AdminQueries {
    node_id: String,
    agent: Option<Arc<dyn AgentCapability>>,
    reporter: Arc<dyn StatusReporter>,
}

impl fmt::Debug for AdminQueries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminQueries")
            .field("node_id", &self.node_id)
            .field("configured", &self.agent.is_some())
            .finish_non_exhaustive()
    }
}

impl AdminQueries {
    pub(crate) fn new(
        node_id: impl Into<String>,
        agent: Option<Arc<dyn AgentCapability>>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            agent,
            reporter,
        }
    }

    /// Returns the agent's identity, configuration and mappings, onboarding first
    /// if needed.
    pub async fn agent_info(&self) -> Value {
        let result = async {
            let agent = self.agent()?;
            if !agent.is_onboarded() {
                agent.onboard().await?;
            }
            let configuration = agent.data_source_configuration().await?;
            let mappings = agent.data_mappings().await?;
            Ok::<_, AgentError>(json!({
                "id": self.node_id,
                "clientid": agent.client_id(),
                "isOnboarded": agent.is_onboarded(),
                "configuration": configuration,
                "mappings": mappings,
            }))
        }
        .await;
        self.respond(result)
    }

    /// Reads the asset `asset_id`, including shared assets.
    pub async fn asset(&self, asset_id: &str) -> Value {
        let result = async {
            let agent = self.agent()?;
            if !agent.is_onboarded() {
                agent.onboard().await?;
            }
            agent.get_asset(asset_id, true).await
        }
        .await;
        self.respond(result)
    }

    fn agent(&self) -> AgentResult<&dyn AgentCapability> {
        self.agent.as_deref().ok_or_else(|| {
            AgentError::configuration(format!(
                "There is no agent configured at node with id {}",
                self.node_id
            ))
        })
    }

    fn respond(&self, result: AgentResult<Value>) -> Value {
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(node_id = %self.node_id, error = %err, "admin query failed");
                self.reporter
                    .report_status(NodeStatus::failure(format!("Error occured:  {err}")));
                json!({ "error": err.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bridge_telemetry::{CollectingReporter, StatusFill};

    use super::*;
    use crate::test_support::{CLIENT_ID, MockAgent};

    #[tokio::test]
    async fn agent_info_onboards_first() {
        let agent = MockAgent::new();
        let reporter = CollectingReporter::new();
        let admin = AdminQueries::new("node-1", Some(agent.clone()), reporter.clone());

        let info = admin.agent_info().await;

        assert_eq!(MockAgent::count(&agent.onboard_calls), 1);
        assert_eq!(info["id"], json!("node-1"));
        assert_eq!(info["clientid"], json!(CLIENT_ID));
        assert_eq!(info["isOnboarded"], json!(true));
        assert_eq!(info["configuration"]["configurationId"], json!("cfg-1"));
        assert!(reporter.statuses().is_empty());
    }

    #[tokio::test]
    async fn missing_agent_is_an_error_object() {
        let reporter = CollectingReporter::new();
        let admin = AdminQueries::new("node-9", None, reporter.clone());

        let response = admin.asset("a1").await;

        let error = response["error"].as_str().unwrap();
        assert!(error.ends_with("There is no agent configured at node with id node-9"));
        let status = reporter.statuses().pop().unwrap();
        assert_eq!(status.fill(), StatusFill::Red);
        assert!(status.text().starts_with("Error occured:  "));
    }

    #[tokio::test]
    async fn asset_lookup_includes_shared_assets() {
        let admin = AdminQueries::new("node-1", Some(MockAgent::ready()), CollectingReporter::new());

        let asset = admin.asset("a1").await;

        assert_eq!(asset["assetId"], json!("a1"));
        assert_eq!(asset["shared"], json!(true));
    }
}
