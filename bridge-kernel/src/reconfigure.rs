//! Live reconfiguration through the host flow round-trip.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bridge_adapters::flow::{FlowError, FlowStore, apply_node_config};
use bridge_config::{AgentSettings, ConfigError, NodeConfig, NodeIdentity};
use bridge_telemetry::{NodeStatus, StatusFill, StatusReporter, StatusShape};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

/// Pauses between the reconfiguration status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconfigurationDelays {
    /// Wait after announcing the received configuration.
    pub acknowledge: Duration,
    /// Wait after announcing the restart.
    pub restart: Duration,
}

impl Default for ReconfigurationDelays {
    fn default() -> Self {
        Self {
            acknowledge: Duration::from_millis(300),
            restart: Duration::from_secs(1),
        }
    }
}

/// Underlying failure of a reload.
#[derive(Debug, Error)]
pub enum ReloadCause {
    /// The payload did not produce valid settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The flow round-trip failed.
    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// A reconfiguration could not be applied. The previous settings stay active.
#[derive(Debug, Error)]
#[error("Error occurred reloading flow: {flow_id}, {node_id} {cause}")]
pub struct ReloadError {
    /// Flow that was being reloaded.
    pub flow_id: String,
    /// Node that was being reconfigured.
    pub node_id: String,
    /// What went wrong.
    #[source]
    pub cause: ReloadCause,
}

/// Applies reconfiguration payloads to the host flow.
#[derive(Clone)]
pub struct ReconfigurationController {
    flow_store: Arc<dyn FlowStore>,
    identity: NodeIdentity,
    delays: ReconfigurationDelays,
}

impl fmt::Debug for ReconfigurationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigurationController")
            .field("identity", &self.identity)
            .field("delays", &self.delays)
            .finish_non_exhaustive()
    }
}

impl ReconfigurationController {
    /// Creates a controller for the node `identity`.
    #[must_use]
    pub fn new(flow_store: Arc<dyn FlowStore>, identity: NodeIdentity) -> Self {
        Self {
            flow_store,
            identity,
            delays: ReconfigurationDelays::default(),
        }
    }

    /// Overrides the status pauses.
    #[must_use]
    pub const fn with_delays(mut self, delays: ReconfigurationDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Validates `payload`, writes it into the host flow and returns the new
    /// settings.
    ///
    /// Nothing is applied by this call: the caller swaps the returned settings in,
    /// so a failed round-trip leaves the running configuration untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError`] when the payload is not a valid configuration or the
    /// flow cannot be fetched, patched or persisted.
    pub async fn reconfigure(
        &self,
        payload: &Value,
        reporter: &dyn StatusReporter,
    ) -> Result<AgentSettings, ReloadError> {
        reporter.report_status(NodeStatus::waiting("received remote configuration..."));
        sleep(self.delays.acknowledge).await;
        reporter.report_status(NodeStatus::new(
            StatusFill::Yellow,
            StatusShape::Dot,
            "the flow will restart in 1 second...",
        ));
        sleep(self.delays.restart).await;

        match self.round_trip(payload).await {
            Ok(settings) => {
                info!(
                    flow_id = self.identity.flow_id(),
                    node_id = self.identity.node_id(),
                    "flow reloaded with new configuration"
                );
                Ok(settings)
            }
            Err(cause) => {
                warn!(
                    flow_id = self.identity.flow_id(),
                    node_id = self.identity.node_id(),
                    error = %cause,
                    "flow reload failed"
                );
                Err(ReloadError {
                    flow_id: self.identity.flow_id().to_owned(),
                    node_id: self.identity.node_id().to_owned(),
                    cause,
                })
            }
        }
    }

    async fn round_trip(&self, payload: &Value) -> Result<AgentSettings, ReloadCause> {
        let config = NodeConfig::from_value(payload.clone())?;
        let settings = AgentSettings::from_config(&config)?;
        let fields = config.to_flow_fields()?;

        let flow_id = self.identity.flow_id();
        let mut flow = self.flow_store.fetch_flow(flow_id).await?;
        apply_node_config(&mut flow, self.identity.node_id(), &fields)?;
        self.flow_store.persist_flow(flow_id, &flow).await?;
        Ok(settings)
    }
}
