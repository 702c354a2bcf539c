//! Ordered structural classification of payloads.

use bridge_primitives::{ActionKind, Message};
use serde_json::Value;
use tracing::trace;

use crate::{ClassificationReport, SchemaKind, SchemaMatcher, SchemaResult};

/// The kind of work a payload represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Control action.
    Action(ActionKind),
    /// Domain event.
    Event,
    /// File upload to an asset.
    FileUpload,
    /// File upload to the data lake.
    DataLakeFileUpload,
    /// Enumerated backend query.
    SdkOperation,
    /// Bulk time series.
    BulkTimeSeries,
    /// Time series.
    TimeSeries,
    /// Matched no schema.
    Unrecognized(ClassificationReport),
}

impl MessageKind {
    /// Returns a short, stable name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Action(ActionKind::Await) => "await",
            Self::Action(ActionKind::Renew) => "renew",
            Self::Event => "event",
            Self::FileUpload => "file",
            Self::DataLakeFileUpload => "data lake file",
            Self::SdkOperation => "sdk operation",
            Self::BulkTimeSeries => "bulk time series",
            Self::TimeSeries => "time series",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Classifies payloads against the built-in schemas in precedence order.
///
/// Classification has no side effects: the same payload always yields the same
/// kind and, for unrecognised payloads, the same report.
#[derive(Debug)]
pub struct PayloadClassifier {
    matchers: Vec<SchemaMatcher>,
    reconfiguration: SchemaMatcher,
}

impl PayloadClassifier {
    /// Compiles every built-in schema.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SchemaError`] when a schema fails to compile.
    pub fn new() -> SchemaResult<Self> {
        let matchers = SchemaKind::PRECEDENCE
            .into_iter()
            .map(SchemaMatcher::new)
            .collect::<SchemaResult<Vec<_>>>()?;
        let reconfiguration = SchemaMatcher::new(SchemaKind::Reconfiguration)?;
        Ok(Self {
            matchers,
            reconfiguration,
        })
    }

    /// Returns `true` when the payload is a remote reconfiguration request.
    ///
    /// This check runs ahead of [`classify`](Self::classify); reconfiguration is not
    /// a [`MessageKind`].
    #[must_use]
    pub fn is_reconfiguration(&self, payload: &Value) -> bool {
        self.reconfiguration.matches(payload)
    }

    /// Classifies a bare payload.
    #[must_use]
    pub fn classify(&self, payload: &Value) -> MessageKind {
        self.classify_with(payload, false)
    }

    /// Classifies a message, honouring its `_customEvent` flag.
    ///
    /// A custom event skips the event schema but still loses to an action. The
    /// flag bypasses event validation entirely, so a payload classified as
    /// [`MessageKind::Event`] is not necessarily valid against the event schema.
    #[must_use]
    pub fn classify_message(&self, message: &Message) -> MessageKind {
        self.classify_with(message.payload(), message.flags().custom_event)
    }

    fn classify_with(&self, payload: &Value, custom_event: bool) -> MessageKind {
        for matcher in &self.matchers {
            let kind = matcher.kind();
            if kind == SchemaKind::Event && custom_event {
                return MessageKind::Event;
            }
            if matcher.matches(payload) {
                trace!(kind = %kind, "payload classified");
                return resolve(kind, payload);
            }
        }
        MessageKind::Unrecognized(self.report(payload))
    }

    /// Builds the report of every schema's errors for `payload`.
    #[must_use]
    pub fn report(&self, payload: &Value) -> ClassificationReport {
        let mut report = ClassificationReport::new();
        for matcher in self.matchers.iter().chain(std::iter::once(&self.reconfiguration)) {
            report.record(matcher.kind(), matcher.errors(payload));
        }
        report
    }
}

impl Default for PayloadClassifier {
    /// # Panics
    ///
    /// Panics if a built-in schema fails to compile.
    fn default() -> Self {
        Self::new().expect("built-in schemas compile")
    }
}

fn resolve(kind: SchemaKind, payload: &Value) -> MessageKind {
    match kind {
        SchemaKind::Action => match payload.get("action").and_then(Value::as_str) {
            Some("await") => MessageKind::Action(ActionKind::Await),
            _ => MessageKind::Action(ActionKind::Renew),
        },
        SchemaKind::Event => MessageKind::Event,
        SchemaKind::FileUpload => MessageKind::FileUpload,
        SchemaKind::DataLakeFileUpload => MessageKind::DataLakeFileUpload,
        SchemaKind::SdkOperation => MessageKind::SdkOperation,
        SchemaKind::BulkTimeSeries => MessageKind::BulkTimeSeries,
        SchemaKind::TimeSeries => MessageKind::TimeSeries,
        SchemaKind::Reconfiguration => unreachable!("reconfiguration is not in the precedence order"),
    }
}
