//! The dispatch engine: classification, prerequisites, submission and drains.

use std::fmt;
use std::sync::Arc;

use bridge_adapters::flow::FlowStore;
use bridge_adapters::traits::{AgentCapability, AgentError, AgentProvider};
use bridge_config::{AgentSettings, ConfigError, NodeConfig, NodeIdentity};
use bridge_primitives::{ActionKind, ControlFlags, Message};
use bridge_schema::{MessageKind, PayloadClassifier, SchemaError};
use bridge_telemetry::{NodeStatus, StatusFill, StatusReporter, StatusShape};
use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::admin::AdminQueries;
use crate::batch::{BatchSummary, InFlightBatch};
use crate::lifecycle::{EngineEvent, EngineState, Lifecycle, LifecycleError};
use crate::operations::{OperationContext, OperationKind, OperationRegistry, execute, record_failure};
use crate::reconfigure::{ReconfigurationController, ReconfigurationDelays, ReloadError};
use crate::retry::{RetryExecutor, RetryPolicy};

const RECONFIGURED: &str =
    "the configuration was received and the flow was restarted. please reload your browser!";

/// Result alias for dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Blocking step run before a message is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrerequisiteStep {
    /// Registering the agent.
    OnBoard,
    /// Fetching the data source configuration.
    GetConfiguration,
}

impl PrerequisiteStep {
    /// Label used in retry statuses.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OnBoard => "OnBoard",
            Self::GetConfiguration => "GetConfiguration",
        }
    }
}

impl fmt::Display for PrerequisiteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failures that abort the handling of one message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The built-in schemas failed to compile.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No agent could be built from the current configuration.
    #[error("Error creating mindconnect agent occured. Have you setup the certificate?")]
    NotConfigured,

    /// Onboarding or the configuration fetch failed after its retries.
    #[error("{step}: {source}")]
    Prerequisite {
        /// Step that failed.
        step: PrerequisiteStep,
        /// Last agent error.
        #[source]
        source: AgentError,
    },

    /// The `_time` override is not an instant.
    #[error(transparent)]
    Timestamp(#[from] bridge_primitives::Error),

    /// The message carries no payload.
    #[error("you have to have a payload in your msg.payload to post the data!")]
    MissingPayload,

    /// No operation is registered for the classified kind.
    #[error("no operation registered for {kind} messages")]
    UnsupportedOperation {
        /// Classified kind.
        kind: &'static str,
    },

    /// The node configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The agent could not be built.
    #[error(transparent)]
    Agent(AgentError),

    /// A reconfiguration could not be applied.
    #[error(transparent)]
    Reload(#[from] ReloadError),

    /// The engine is not accepting messages.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl DispatchError {
    /// Short name of the failure, used in `_errorObject`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Schema(_) => "SchemaError",
            Self::NotConfigured | Self::Configuration(_) | Self::Agent(_) => "ConfigurationError",
            Self::Prerequisite { .. } => "PrerequisiteError",
            Self::Timestamp(_) | Self::MissingPayload => "ValidationError",
            Self::UnsupportedOperation { .. } => "OperationError",
            Self::Reload(_) => "ReloadError",
            Self::Lifecycle(_) => "LifecycleError",
        }
    }

    /// Encodes the failure as the `_errorObject` attached to messages.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({ "name": self.name(), "message": self.to_string() })
    }
}

/// What happened to a dispatched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message was a reconfiguration and the new settings are active.
    Reconfigured,
    /// The message was a control action that is disabled.
    Skipped,
    /// The message was classified and, unless it was an await, submitted.
    Accepted {
        /// Classified kind.
        kind: MessageKind,
        /// Counts of the drain this message triggered.
        drained: Option<BatchSummary>,
    },
}

/// Builder for [`DispatchEngine`].
pub struct DispatchEngineBuilder {
    identity: NodeIdentity,
    provider: Arc<dyn AgentProvider>,
    reporter: Arc<dyn StatusReporter>,
    flow_store: Arc<dyn FlowStore>,
    registry: OperationRegistry,
    delays: ReconfigurationDelays,
}

impl fmt::Debug for DispatchEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngineBuilder")
            .field("identity", &self.identity)
            .field("registry", &self.registry)
            .field("delays", &self.delays)
            .finish_non_exhaustive()
    }
}

impl DispatchEngineBuilder {
    /// Replaces the operation registry.
    #[must_use]
    pub fn registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides the pauses of the reconfiguration status sequence.
    #[must_use]
    pub fn reconfiguration_delays(mut self, delays: ReconfigurationDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Compiles the schemas and builds an engine awaiting [`DispatchEngine::start`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Schema`] if a built-in schema fails to compile.
    pub fn build(self) -> DispatchResult<DispatchEngine> {
        let classifier = PayloadClassifier::new()?;
        let reconfiguration =
            ReconfigurationController::new(self.flow_store, self.identity.clone())
                .with_delays(self.delays);
        Ok(DispatchEngine {
            identity: self.identity,
            provider: self.provider,
            reporter: self.reporter,
            classifier,
            registry: self.registry,
            reconfiguration,
            lifecycle: Lifecycle::new(),
            settings: None,
            agent: None,
            batch: InFlightBatch::new(),
            await_requested: false,
            sequence: 0,
            generation: 0,
        })
    }
}

/// Routes inbound messages to outbound operations.
///
/// The engine handles one message at a time (`&mut self`); the operations it
/// submits run concurrently on the tokio runtime and are tracked in the in-flight
/// batch until a drain counts them.
pub struct DispatchEngine {
    identity: NodeIdentity,
    provider: Arc<dyn AgentProvider>,
    reporter: Arc<dyn StatusReporter>,
    classifier: PayloadClassifier,
    registry: OperationRegistry,
    reconfiguration: ReconfigurationController,
    lifecycle: Lifecycle,
    settings: Option<Arc<AgentSettings>>,
    agent: Option<Arc<dyn AgentCapability>>,
    batch: InFlightBatch,
    await_requested: bool,
    sequence: u64,
    generation: u64,
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("identity", &self.identity)
            .field("state", &self.lifecycle.state())
            .field("settings", &self.settings)
            .field("batch", &self.batch)
            .field("await_requested", &self.await_requested)
            .field("sequence", &self.sequence)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Starts building an engine for the node `identity`.
    #[must_use]
    pub fn builder(
        identity: NodeIdentity,
        provider: Arc<dyn AgentProvider>,
        reporter: Arc<dyn StatusReporter>,
        flow_store: Arc<dyn FlowStore>,
    ) -> DispatchEngineBuilder {
        DispatchEngineBuilder {
            identity,
            provider,
            reporter,
            flow_store,
            registry: OperationRegistry::with_builtin(),
            delays: ReconfigurationDelays::default(),
        }
    }

    /// Starts the engine with validated settings.
    ///
    /// A failure is reported and leaves the engine started but unconfigured: only
    /// a reconfiguration can make it functional.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Agent`] when no agent can be built, or
    /// [`DispatchError::Lifecycle`] when the engine was already closed.
    pub fn start(&mut self, settings: AgentSettings) -> DispatchResult<()> {
        self.lifecycle.transition(EngineEvent::Start)?;
        let result = self.install(settings);
        if let Err(err) = &result {
            self.report_configuration_failure(err);
        }
        result
    }

    /// Validates a node configuration and starts the engine with it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] for invalid settings, plus the
    /// errors of [`start`](Self::start).
    pub fn start_from_config(&mut self, config: &NodeConfig) -> DispatchResult<()> {
        match AgentSettings::from_config(config) {
            Ok(settings) => self.start(settings),
            Err(err) => {
                self.lifecycle.transition(EngineEvent::Start)?;
                let err = DispatchError::from(err);
                self.report_configuration_failure(&err);
                Err(err)
            }
        }
    }

    /// Handles one inbound message.
    ///
    /// Failures after acceptance tag the message `Error` and forward it, and
    /// forget the in-flight batch; operations already running are not cancelled.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] that aborted the message.
    pub async fn dispatch(&mut self, mut message: Message) -> DispatchResult<DispatchOutcome> {
        self.lifecycle.transition(EngineEvent::Accept)?;

        match self.handle(&mut message).await {
            Ok(outcome) => {
                self.lifecycle.transition(EngineEvent::Complete)?;
                Ok(outcome)
            }
            Err(err) => {
                if matches!(err, DispatchError::NotConfigured) {
                    self.reporter.report_error(&err.to_string());
                } else {
                    self.abandon(&mut message, &err);
                }
                self.lifecycle.transition(EngineEvent::Fail)?;
                Err(err)
            }
        }
    }

    /// Closes the engine; later messages are rejected.
    ///
    /// Running operations are detached, not cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Lifecycle`] if the transition is rejected.
    pub fn close(&mut self) -> DispatchResult<()> {
        self.lifecycle.transition(EngineEvent::Close)?;
        self.batch.clear();
        self.await_requested = false;
        info!(node_id = self.identity.node_id(), "dispatch engine closed");
        Ok(())
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Returns the node identity.
    #[must_use]
    pub const fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Returns the active settings, if any.
    #[must_use]
    pub fn settings(&self) -> Option<Arc<AgentSettings>> {
        self.settings.clone()
    }

    /// Counter bumped whenever new settings become active.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of entries in the in-flight batch.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.batch.len()
    }

    /// Returns admin queries bound to the current agent.
    #[must_use]
    pub fn admin(&self) -> AdminQueries {
        AdminQueries::new(
            self.identity.node_id(),
            self.agent.clone(),
            Arc::clone(&self.reporter),
        )
    }

    fn install(&mut self, settings: AgentSettings) -> DispatchResult<()> {
        let agent = self.provider.build(&settings).map_err(DispatchError::Agent)?;
        let summary = settings.describe();
        info!(
            node_id = self.identity.node_id(),
            client_id = %agent.client_id(),
            "{summary}"
        );
        self.reporter.log(&summary);
        if !settings.suppress_verbosity() {
            self.reporter.report_status(NodeStatus::working(summary));
        }

        self.batch.clear();
        self.await_requested = false;
        self.settings = Some(Arc::new(settings));
        self.agent = Some(agent);
        self.generation += 1;
        Ok(())
    }

    fn report_configuration_failure(&self, err: &DispatchError) {
        warn!(node_id = self.identity.node_id(), error = %err, "agent configuration failed");
        self.reporter.report_error(&err.to_string());
        self.reporter.report_status(NodeStatus::new(
            StatusFill::Red,
            StatusShape::Ring,
            format!("Error occured {err}"),
        ));
    }

    fn abandon(&mut self, message: &mut Message, err: &DispatchError) {
        warn!(node_id = self.identity.node_id(), error = %err, "message abandoned");
        record_failure(
            self.reporter.as_ref(),
            message,
            &err.to_string(),
            err.to_value(),
            None,
            true,
        );
        self.batch.clear();
        self.await_requested = false;
    }

    async fn handle(&mut self, message: &mut Message) -> DispatchResult<DispatchOutcome> {
        if self.classifier.is_reconfiguration(message.payload()) {
            return self.apply_reconfiguration(message.payload()).await;
        }

        let (Some(agent), Some(settings)) = (self.agent.clone(), self.settings.clone()) else {
            return Err(DispatchError::NotConfigured);
        };

        self.ensure_prerequisites(agent.as_ref(), &settings, message.flags())
            .await?;

        let timestamp = message.resolve_timestamp(Utc::now())?;
        self.progress(&settings, NodeStatus::working("posting data"));
        if message.payload().is_null() {
            return Err(DispatchError::MissingPayload);
        }

        let kind = self.classifier.classify_message(message);
        debug!(kind = kind.as_str(), "message classified");
        match &kind {
            MessageKind::Action(ActionKind::Await) => self.await_requested = true,
            MessageKind::Action(ActionKind::Renew) if !settings.keep_alive() => {
                self.reporter.log("Keep alive for this agent is disabled");
                return Ok(DispatchOutcome::Skipped);
            }
            MessageKind::Unrecognized(report) => {
                self.lifecycle.transition(EngineEvent::Submit)?;
                self.sequence += 1;
                record_failure(
                    self.reporter.as_ref(),
                    message,
                    report.message(),
                    report.to_value(),
                    Some(self.sequence),
                    true,
                );
                self.batch.submit_settled(message.clone());
            }
            other => {
                let operation = OperationKind::for_message(other)
                    .and_then(|operation| self.registry.get(operation))
                    .ok_or(DispatchError::UnsupportedOperation {
                        kind: other.as_str(),
                    })?;
                self.lifecycle.transition(EngineEvent::Submit)?;
                self.sequence += 1;
                debug!(
                    operation = %operation.kind(),
                    request = self.sequence,
                    "operation submitted"
                );
                let ctx = OperationContext::new(
                    agent,
                    Arc::clone(&settings),
                    Arc::clone(&self.reporter),
                    timestamp,
                    self.sequence,
                );
                self.batch
                    .submit(tokio::spawn(execute(operation, ctx, message.clone())));
            }
        }

        let drained = self.evaluate_drain(&settings).await?;
        Ok(DispatchOutcome::Accepted { kind, drained })
    }

    async fn apply_reconfiguration(&mut self, payload: &Value) -> DispatchResult<DispatchOutcome> {
        let settings = self
            .reconfiguration
            .reconfigure(payload, self.reporter.as_ref())
            .await?;
        self.install(settings)?;
        self.reporter.report_status(NodeStatus::success(RECONFIGURED));
        Ok(DispatchOutcome::Reconfigured)
    }

    async fn ensure_prerequisites(
        &self,
        agent: &dyn AgentCapability,
        settings: &AgentSettings,
        flags: ControlFlags,
    ) -> DispatchResult<()> {
        let retry = RetryExecutor::new(
            RetryPolicy::new(settings.retry()),
            Arc::clone(&self.reporter),
        );

        if !agent.is_onboarded() || flags.force_onboard {
            self.progress(settings, NodeStatus::working("onboarding"));
            let step = PrerequisiteStep::OnBoard;
            retry
                .run(step.label(), || agent.onboard())
                .await
                .map_err(|source| DispatchError::Prerequisite { step, source })?;
        }

        let needs_configuration = !agent.has_data_source_configuration() || flags.force_get_config;
        if needs_configuration && !settings.data_lake_only() {
            self.progress(settings, NodeStatus::working("getting configuration"));
            let step = PrerequisiteStep::GetConfiguration;
            retry
                .run(step.label(), || agent.data_source_configuration())
                .await
                .map_err(|source| DispatchError::Prerequisite { step, source })?;
        }
        Ok(())
    }

    async fn evaluate_drain(
        &mut self,
        settings: &AgentSettings,
    ) -> DispatchResult<Option<BatchSummary>> {
        let submitted = self.batch.len();
        let due = submitted > 0
            && (submitted % settings.parallel().get() == 0 || self.await_requested);
        if !due {
            if submitted == 0 {
                self.await_requested = false;
            }
            self.lifecycle.transition(EngineEvent::Hold)?;
            return Ok(None);
        }

        self.lifecycle.transition(EngineEvent::Drain)?;
        self.progress(
            settings,
            NodeStatus::waiting(format!("waiting for {submitted} requests to finish")),
        );
        self.batch.settle(settings.async_duration()).await;
        let summary = self.batch.drain();
        self.await_requested = false;

        info!(
            requests = summary.requests,
            success = summary.success,
            errors = summary.errors,
            pending = summary.pending,
            "batch drained"
        );
        self.reporter.log(&summary.to_string());
        if summary.errors > 0 {
            self.reporter
                .report_status(NodeStatus::failure(summary.to_string()));
        } else {
            self.progress(settings, NodeStatus::success(summary.to_string()));
        }
        if settings.emit_control() {
            self.reporter.forward(summary.to_control_message());
        }
        Ok(Some(summary))
    }

    fn progress(&self, settings: &AgentSettings, status: NodeStatus) {
        if !settings.suppress_verbosity() {
            self.reporter.report_status(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bridge_adapters::flow::MemoryFlowStore;
    use bridge_primitives::RequestStatus;
    use bridge_telemetry::CollectingReporter;

    use super::*;
    use crate::test_support::{MockAgent, MockProvider, reconfiguration_payload, settings};

    fn engine(agent: &Arc<MockAgent>) -> (DispatchEngine, Arc<CollectingReporter>) {
        let reporter = CollectingReporter::new();
        let engine = DispatchEngine::builder(
            NodeIdentity::new("node-1", "flow-1"),
            MockProvider::new(agent.clone()),
            reporter.clone(),
            Arc::new(MemoryFlowStore::new()),
        )
        .build()
        .unwrap();
        (engine, reporter)
    }

    fn points() -> Message {
        Message::new(json!([{"dataPointId": "1", "qualityCode": "0", "value": "42"}]))
    }

    #[tokio::test]
    async fn messages_are_rejected_before_start() {
        let (mut engine, reporter) = engine(&MockAgent::ready());

        let err = engine.dispatch(points()).await.unwrap_err();

        assert!(matches!(err, DispatchError::Lifecycle(_)));
        assert!(reporter.drain_forwarded().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn prerequisites_are_retried_on_the_next_message() {
        let agent = MockAgent::new();
        agent.failing_onboards.store(2, Ordering::SeqCst);
        let (mut engine, reporter) = engine(&agent);
        engine.start(settings().retry(2).build().unwrap()).unwrap();

        let err = engine.dispatch(points()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Prerequisite {
                step: PrerequisiteStep::OnBoard,
                ..
            }
        ));
        let forwarded = reporter.drain_forwarded();
        assert_eq!(forwarded.len(), 1);
        assert!(forwarded[0].is_error());
        assert_eq!(engine.state(), EngineState::Ready);

        let outcome = engine.dispatch(points()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Accepted { drained: Some(_), .. }));
        assert_eq!(MockAgent::count(&agent.onboard_calls), 3);
        assert_eq!(MockAgent::count(&agent.config_calls), 1);
        assert_eq!(
            reporter.drain_forwarded()[0].status(),
            Some(RequestStatus::Ok)
        );
    }

    #[tokio::test]
    async fn force_flags_rerun_prerequisites_on_a_ready_agent() {
        let agent = MockAgent::ready();
        let (mut engine, _reporter) = engine(&agent);
        engine.start(settings().build().unwrap()).unwrap();

        engine.dispatch(points()).await.unwrap();
        assert_eq!(MockAgent::count(&agent.onboard_calls), 0);
        assert_eq!(MockAgent::count(&agent.config_calls), 0);

        let forced = points().with_flags(ControlFlags {
            force_onboard: true,
            force_get_config: true,
            ..ControlFlags::default()
        });
        engine.dispatch(forced).await.unwrap();
        assert_eq!(MockAgent::count(&agent.onboard_calls), 1);
        assert_eq!(MockAgent::count(&agent.config_calls), 1);

        let onboard_only = points().with_flags(ControlFlags {
            force_onboard: true,
            ..ControlFlags::default()
        });
        engine.dispatch(onboard_only).await.unwrap();
        assert_eq!(MockAgent::count(&agent.onboard_calls), 2);
        assert_eq!(MockAgent::count(&agent.config_calls), 1);
    }

    #[tokio::test]
    async fn custom_event_reaches_the_agent() {
        let agent = MockAgent::ready();
        let (mut engine, reporter) = engine(&agent);
        engine.start(settings().build().unwrap()).unwrap();
        let message = Message::new(json!({
            "typeId": "castidev.PumpAlarm",
            "timestamp": "2024-05-01T12:00:00.000Z",
            "severity": 20,
            "pressure": 7
        }))
        .with_flags(ControlFlags {
            custom_event: true,
            ..ControlFlags::default()
        });

        let outcome = engine.dispatch(message).await.unwrap();

        let summary = match outcome {
            DispatchOutcome::Accepted {
                kind: MessageKind::Event,
                drained: Some(summary),
            } => summary,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.success, 1);
        assert_eq!(MockAgent::count(&agent.event_calls), 1);
        assert_eq!(
            reporter.drain_forwarded()[0].status(),
            Some(RequestStatus::Ok)
        );
    }

    #[tokio::test]
    async fn data_lake_only_skips_the_configuration_fetch() {
        let agent = MockAgent::new();
        let (mut engine, _reporter) = engine(&agent);
        engine
            .start(settings().data_lake_only(true).build().unwrap())
            .unwrap();

        engine.dispatch(points()).await.unwrap();

        assert_eq!(MockAgent::count(&agent.onboard_calls), 1);
        assert_eq!(MockAgent::count(&agent.config_calls), 0);
    }

    #[tokio::test]
    async fn disabled_keep_alive_skips_renewals() {
        let agent = MockAgent::ready();
        let (mut engine, reporter) = engine(&agent);
        engine
            .start(settings().keep_alive(false).build().unwrap())
            .unwrap();

        let outcome = engine
            .dispatch(Message::action(ActionKind::Renew, Utc::now()))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert_eq!(MockAgent::count(&agent.renew_calls), 0);
        assert!(
            reporter
                .logs()
                .contains(&"Keep alive for this agent is disabled".to_owned())
        );
    }

    #[tokio::test]
    async fn missing_payload_is_forwarded_as_error() {
        let (mut engine, reporter) = engine(&MockAgent::ready());
        engine.start(settings().build().unwrap()).unwrap();

        let err = engine.dispatch(Message::new(Value::Null)).await.unwrap_err();

        assert!(matches!(err, DispatchError::MissingPayload));
        let forwarded = reporter.drain_forwarded();
        assert!(
            forwarded[0]
                .outcome()
                .error()
                .unwrap()
                .ends_with("you have to have a payload in your msg.payload to post the data!")
        );
    }

    #[tokio::test]
    async fn invalid_time_override_aborts_the_message() {
        let (mut engine, reporter) = engine(&MockAgent::ready());
        engine.start(settings().build().unwrap()).unwrap();

        let err = engine
            .dispatch(points().with_time(json!("yesterday")))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Timestamp(_)));
        assert_eq!(reporter.drain_forwarded()[0].outcome().error_object().unwrap()["name"], json!("ValidationError"));
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_configuration_waits_for_reconfiguration() {
        let agent = MockAgent::ready();
        let reporter = CollectingReporter::new();
        let store = MemoryFlowStore::new().with_flow(
            "flow-1",
            json!({"nodes": [{"id": "node-1", "type": "mindconnect"}]}),
        );
        let mut engine = DispatchEngine::builder(
            NodeIdentity::new("node-1", "flow-1"),
            MockProvider::new(agent.clone()),
            reporter.clone(),
            Arc::new(store),
        )
        .build()
        .unwrap();

        let mut broken = reconfiguration_payload();
        broken["retry"] = json!("0");
        let config = NodeConfig::from_value(broken).unwrap();
        let err = engine.start_from_config(&config).unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
        assert!(reporter.statuses().pop().unwrap().text().starts_with("Error occured"));

        let err = engine.dispatch(points()).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured));
        assert!(reporter.drain_forwarded().is_empty());

        let outcome = engine
            .dispatch(Message::new(reconfiguration_payload()))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Reconfigured);
        assert_eq!(engine.generation(), 1);
        assert_eq!(engine.settings().unwrap().retry().get(), 4);
    }
}
