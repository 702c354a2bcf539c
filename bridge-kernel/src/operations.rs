//! Outbound operations and the registry that maps message kinds onto them.
//!
//! Every operation mutates only the message it was handed and calls one agent
//! capability (plus its retries). Failures never escape [`execute`]: they are
//! recorded on the message, which is what the batch later counts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_adapters::traits::{AgentCapability, AgentError, FileUploadRequest};
use bridge_config::AgentSettings;
use bridge_primitives::{
    ActionKind, BulkEntry, DataLakeFileInfo, DataPoint, Event, FileInfo, Message, RequestStatus,
    SdkOperation,
};
use bridge_schema::MessageKind;
use bridge_telemetry::{NodeStatus, StatusReporter};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::retry::{RetryExecutor, RetryPolicy};

/// Result alias for operations.
pub type OperationResult<T> = Result<T, OperationError>;

/// Failure of a single operation after its retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The agent call failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Binary file content was sent without a target path.
    #[error("you have to provide the filePath when using Buffer as the payload")]
    MissingFilePath,

    /// The payload could not be decoded into the operation's input.
    #[error("{reason}")]
    InvalidPayload {
        /// Decoder message.
        reason: String,
    },
}

impl OperationError {
    /// Short name of the failure, used in `_errorObject`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Agent(AgentError::Configuration { .. }) => "ConfigurationError",
            Self::Agent(AgentError::InvalidRequest { .. }) => "InvalidRequestError",
            Self::Agent(AgentError::Transport { .. }) => "TransportError",
            Self::Agent(AgentError::Rejected { .. }) => "RejectedError",
            Self::MissingFilePath | Self::InvalidPayload { .. } => "ValidationError",
        }
    }

    /// Encodes the failure as the `_errorObject` attached to messages.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({ "name": self.name(), "message": self.to_string() })
    }
}

impl From<bridge_primitives::Error> for OperationError {
    fn from(err: bridge_primitives::Error) -> Self {
        Self::InvalidPayload {
            reason: err.to_string(),
        }
    }
}

/// Operations the engine can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Rotate the agent token.
    RenewToken,
    /// Post time series values.
    PostTimeSeries,
    /// Post timestamped value sets.
    PostBulkTimeSeries,
    /// Post an event.
    PostEvent,
    /// Upload a file to an asset.
    UploadFile,
    /// Upload a file to the data lake.
    UploadDataLakeFile,
    /// Run an enumerated backend query.
    SdkCall,
}

impl OperationKind {
    /// Returns the operation that handles `kind`, if it is not handled by the
    /// engine itself.
    #[must_use]
    pub const fn for_message(kind: &MessageKind) -> Option<Self> {
        match kind {
            MessageKind::Action(ActionKind::Renew) => Some(Self::RenewToken),
            MessageKind::Event => Some(Self::PostEvent),
            MessageKind::FileUpload => Some(Self::UploadFile),
            MessageKind::DataLakeFileUpload => Some(Self::UploadDataLakeFile),
            MessageKind::SdkOperation => Some(Self::SdkCall),
            MessageKind::BulkTimeSeries => Some(Self::PostBulkTimeSeries),
            MessageKind::TimeSeries => Some(Self::PostTimeSeries),
            MessageKind::Action(ActionKind::Await) | MessageKind::Unrecognized(_) => None,
        }
    }

    /// Returns a short, stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RenewToken => "renew_token",
            Self::PostTimeSeries => "post_time_series",
            Self::PostBulkTimeSeries => "post_bulk_time_series",
            Self::PostEvent => "post_event",
            Self::UploadFile => "upload_file",
            Self::UploadDataLakeFile => "upload_data_lake_file",
            Self::SdkCall => "sdk_call",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an operation may read while it runs.
///
/// The settings are a snapshot; a reconfiguration that happens while the
/// operation is in flight does not affect it.
#[derive(Clone)]
pub struct OperationContext {
    agent: Arc<dyn AgentCapability>,
    settings: Arc<AgentSettings>,
    reporter: Arc<dyn StatusReporter>,
    timestamp: DateTime<Utc>,
    request_count: u64,
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("client_id", &self.agent.client_id())
            .field("timestamp", &self.timestamp)
            .field("request_count", &self.request_count)
            .finish_non_exhaustive()
    }
}

impl OperationContext {
    /// Creates a context for one submission.
    #[must_use]
    pub fn new(
        agent: Arc<dyn AgentCapability>,
        settings: Arc<AgentSettings>,
        reporter: Arc<dyn StatusReporter>,
        timestamp: DateTime<Utc>,
        request_count: u64,
    ) -> Self {
        Self {
            agent,
            settings,
            reporter,
            timestamp,
            request_count,
        }
    }

    /// Returns the agent.
    #[must_use]
    pub fn agent(&self) -> &dyn AgentCapability {
        self.agent.as_ref()
    }

    /// Returns the settings snapshot.
    #[must_use]
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Returns the reporter.
    #[must_use]
    pub fn reporter(&self) -> &dyn StatusReporter {
        self.reporter.as_ref()
    }

    /// Returns the instant the message is posted at.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the sequence number of this submission.
    #[must_use]
    pub const fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Returns a retry executor configured from the settings.
    #[must_use]
    pub fn retry(&self) -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy::new(self.settings.retry()),
            Arc::clone(&self.reporter),
        )
    }

    /// Reports a non-error status unless verbosity is suppressed.
    pub fn progress(&self, status: NodeStatus) {
        if !self.settings.suppress_verbosity() {
            self.reporter.report_status(status);
        }
    }

    /// Logs `text` and shows it as a success status.
    pub fn complete(&self, text: String) {
        self.reporter.log(&text);
        self.progress(NodeStatus::success(text));
    }

    fn stamp(&self) -> String {
        stamp(self.timestamp)
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// An outbound operation.
#[async_trait]
pub trait Operation: Send + Sync {
    /// The kind this operation is registered under.
    fn kind(&self) -> OperationKind;

    /// Whether the processed message goes to the output port.
    ///
    /// Control operations return `false`; their outcome is only visible as
    /// status and log.
    fn forwards(&self) -> bool {
        true
    }

    /// Performs the call, tagging `message` on success.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the payload is unusable or the agent call
    /// still fails after its retries.
    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()>;
}

/// Tags `message` as failed and reports the failure.
///
/// Error statuses are reported even when verbosity is suppressed.
pub(crate) fn record_failure(
    reporter: &dyn StatusReporter,
    message: &mut Message,
    text: &str,
    object: Value,
    request_count: Option<u64>,
    forward: bool,
) {
    reporter.report_error(text);
    message.mark_error(Utc::now(), text, object);
    if let Some(count) = request_count {
        message.set_request_count(count);
    }
    if forward {
        reporter.forward(message.clone());
    }
    reporter.report_status(NodeStatus::failure(text));
}

/// Runs `operation` to completion and returns the tagged message.
pub async fn execute(
    operation: Arc<dyn Operation>,
    ctx: OperationContext,
    mut message: Message,
) -> Message {
    let mut result = operation.perform(&ctx, &mut message).await;
    if result.is_ok() && message.flags().include_token {
        result = match ctx.agent().access_token().await {
            Ok(token) => {
                message.set_token(token);
                Ok(())
            }
            Err(err) => Err(err.into()),
        };
    }

    match result {
        Ok(()) => {
            info!(
                operation = %operation.kind(),
                request = ctx.request_count(),
                status = ?message.status(),
                "operation completed"
            );
            if operation.forwards() {
                ctx.reporter().forward(message.clone());
            }
        }
        Err(err) => {
            warn!(
                operation = %operation.kind(),
                request = ctx.request_count(),
                error = %err,
                "operation failed"
            );
            record_failure(
                ctx.reporter(),
                &mut message,
                &err.to_string(),
                err.to_value(),
                Some(ctx.request_count()),
                operation.forwards(),
            );
        }
    }
    message
}

/// Rotates the agent token.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenewToken;

#[async_trait]
impl Operation for RenewToken {
    fn kind(&self) -> OperationKind {
        OperationKind::RenewToken
    }

    fn forwards(&self) -> bool {
        false
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        ctx.progress(NodeStatus::working("renewing agent token"));
        let agent = ctx.agent();
        ctx.retry().run("RenewToken", || agent.renew_token()).await?;
        ctx.complete(format!("Last keep alive key rotation at {}", ctx.stamp()));
        message.mark_ok();
        Ok(())
    }
}

/// Posts time series values.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostTimeSeries;

#[async_trait]
impl Operation for PostTimeSeries {
    fn kind(&self) -> OperationKind {
        OperationKind::PostTimeSeries
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        let points = DataPoint::list_from_payload(message.payload())?;
        ctx.progress(NodeStatus::working("recieved data points"));

        let agent = ctx.agent();
        let (timestamp, validate) = (ctx.timestamp(), ctx.settings().validate());
        ctx.retry()
            .run("PostData", || agent.post_data(&points, timestamp, validate))
            .await?;

        ctx.complete(format!("Posted last message at {}", ctx.stamp()));
        message.mark_ok();
        Ok(())
    }
}

/// Posts timestamped value sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostBulkTimeSeries;

#[async_trait]
impl Operation for PostBulkTimeSeries {
    fn kind(&self) -> OperationKind {
        OperationKind::PostBulkTimeSeries
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        let entries = BulkEntry::list_from_payload(message.payload())?;
        ctx.progress(NodeStatus::working(format!(
            "recieved {} data points for bulk upload ",
            entries.len()
        )));

        let agent = ctx.agent();
        let validate = ctx.settings().validate();
        ctx.retry()
            .run("BulkPost", || agent.bulk_post_data(&entries, validate))
            .await?;

        ctx.complete(format!("Posted last bulk message at {}", ctx.stamp()));
        message.mark_ok();
        Ok(())
    }
}

/// Posts an event, defaulting its entity to the agent itself.
///
/// Messages flagged `_customEvent` are posted as the raw payload object, without
/// decoding the standard event fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostEvent;

#[async_trait]
impl Operation for PostEvent {
    fn kind(&self) -> OperationKind {
        OperationKind::PostEvent
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        ctx.progress(NodeStatus::working("recieved event"));
        if let Value::Object(fields) = message.payload_mut() {
            let missing = fields
                .get("entityId")
                .is_none_or(|id| id.is_null() || id.as_str() == Some(""));
            if missing {
                fields.insert("entityId".to_owned(), Value::String(ctx.agent().client_id()));
            }
        }

        let agent = ctx.agent();
        let (timestamp, validate) = (ctx.timestamp(), ctx.settings().validate_event());
        let accepted = if message.flags().custom_event {
            let Value::Object(fields) = message.payload() else {
                return Err(OperationError::InvalidPayload {
                    reason: "a custom event must be a JSON object".to_owned(),
                });
            };
            ctx.retry()
                .run("PostEvent", || {
                    agent.post_custom_event(fields, timestamp, validate)
                })
                .await?
        } else {
            let event = Event::from_payload(message.payload())?;
            ctx.retry()
                .run("PostEvent", || agent.post_event(&event, timestamp, validate))
                .await?
        };

        ctx.complete(format!("Posted last event at {}", ctx.stamp()));
        message.set_status(if accepted {
            RequestStatus::Ok
        } else {
            RequestStatus::Error
        });
        Ok(())
    }
}

/// Uploads a file to an asset.
///
/// The upload retries per chunk inside the agent, so the call is not wrapped in a
/// [`RetryExecutor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadFile;

#[async_trait]
impl Operation for UploadFile {
    fn kind(&self) -> OperationKind {
        OperationKind::UploadFile
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        let info = FileInfo::from_payload(message.payload())?;
        ctx.progress(NodeStatus::working(format!(
            "recieved fileInfo {}",
            info.file_name.describe()
        )));

        if info.file_name.is_binary() && info.file_path.is_none() {
            return Err(OperationError::MissingFilePath);
        }

        let settings = ctx.settings();
        let request = FileUploadRequest {
            entity_id: info
                .entity_id
                .map_or_else(|| ctx.agent().client_id(), String::from),
            file_path: info
                .file_path
                .unwrap_or_else(|| info.file_name.describe().to_owned()),
            source: info.file_name,
            file_type: info.file_type,
            chunk: settings.chunk(),
            parallel_uploads: settings.parallel().get(),
            retry: settings.retry().get(),
        };
        ctx.agent().upload_file(request).await?;

        ctx.complete(format!("Uploaded file at {}", ctx.stamp()));
        message.mark_ok();
        Ok(())
    }
}

/// Uploads a file to the data lake through a signed URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadDataLakeFile;

#[async_trait]
impl Operation for UploadDataLakeFile {
    fn kind(&self) -> OperationKind {
        OperationKind::UploadDataLakeFile
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        let info = DataLakeFileInfo::from_payload(message.payload())?;
        ctx.progress(NodeStatus::working(format!(
            "recieved fileInfo {} at {}",
            info.data_lake_file.describe(),
            ctx.stamp()
        )));

        let agent = ctx.agent();
        let retry = ctx.retry();
        let path = format!("/{}/{}", agent.client_id(), info.data_lake_file_path);
        let sub_tenant = info.sub_tenant_id.as_deref();
        let signed_url = retry
            .run("GenerateUploadObjectUrl", || {
                agent.generate_upload_url(&path, sub_tenant)
            })
            .await?;

        let skip_upload = message.flags().ignore_payload;
        ctx.progress(NodeStatus::working(format!(
            "generated upload URL : {}",
            if skip_upload {
                "skipping upload"
            } else {
                "uploading file"
            }
        )));
        message.set_signed_url(signed_url.clone());
        message.mark_ok();

        if !skip_upload {
            let source = &info.data_lake_file;
            retry
                .run("PutFileToDataLake", || agent.put_file(source, &signed_url))
                .await?;
            let uploaded = stamp(Utc::now());
            ctx.reporter()
                .log(&format!("Uploaded file at {uploaded} to Data Lake"));
            ctx.progress(NodeStatus::success(format!(
                "Uploaded file at {uploaded} to data lake."
            )));
        }
        Ok(())
    }
}

/// Runs one of the enumerated backend queries and replaces the payload with its
/// result.
#[derive(Debug, Default, Clone, Copy)]
pub struct SdkCall;

#[async_trait]
impl Operation for SdkCall {
    fn kind(&self) -> OperationKind {
        OperationKind::SdkCall
    }

    async fn perform(&self, ctx: &OperationContext, message: &mut Message) -> OperationResult<()> {
        let operation = SdkOperation::from_payload(message.payload())?;
        let agent = ctx.agent();
        let retry = ctx.retry();

        let (result, text) = match &operation {
            SdkOperation::GetAsset {
                asset_id,
                include_shared,
                property_names,
            } => {
                ctx.progress(NodeStatus::working("reading asset data"));
                let include_shared = *include_shared;
                let asset = retry
                    .run("Get AssetInfo", || agent.get_asset(asset_id, include_shared))
                    .await?;
                (
                    select_properties(asset, property_names),
                    format!("got asset info for asset with {asset_id} at {}", ctx.stamp()),
                )
            }
            SdkOperation::GetDataSourceConfiguration => {
                ctx.progress(NodeStatus::working("reading data source configuration"));
                let configuration = retry
                    .run("GetDataSourceConfiguration", || {
                        agent.data_source_configuration()
                    })
                    .await?;
                (configuration, executed(&operation, ctx))
            }
            SdkOperation::GetDataMappings => {
                ctx.progress(NodeStatus::working("reading data mappings"));
                let mappings = retry
                    .run("GetDataMappings", || agent.data_mappings())
                    .await?;
                (mappings, executed(&operation, ctx))
            }
        };

        ctx.complete(text);
        message.set_payload(result);
        message.mark_ok();
        Ok(())
    }
}

fn executed(operation: &SdkOperation, ctx: &OperationContext) -> String {
    format!("executed sdk operation {} at {}", operation.name(), ctx.stamp())
}

fn select_properties(asset: Value, names: &[String]) -> Value {
    if names.is_empty() {
        return asset;
    }
    let selected: Map<String, Value> = names
        .iter()
        .map(|name| (name.clone(), asset.get(name).cloned().unwrap_or(Value::Null)))
        .collect();
    Value::Object(selected)
}

/// Operations available to the engine, keyed by kind.
#[derive(Clone)]
pub struct OperationRegistry {
    operations: HashMap<OperationKind, Arc<dyn Operation>>,
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("kinds", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Creates a registry holding every built-in operation.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RenewToken));
        registry.register(Arc::new(PostTimeSeries));
        registry.register(Arc::new(PostBulkTimeSeries));
        registry.register(Arc::new(PostEvent));
        registry.register(Arc::new(UploadFile));
        registry.register(Arc::new(UploadDataLakeFile));
        registry.register(Arc::new(SdkCall));
        registry
    }

    /// Registers an operation under its kind, returning the one it replaced.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> Option<Arc<dyn Operation>> {
        self.operations.insert(operation.kind(), operation)
    }

    /// Looks up the operation for `kind`.
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn Operation>> {
        self.operations.get(&kind).cloned()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` when no operation is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
