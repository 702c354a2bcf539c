//! Inbound message envelope and the result fields added during dispatch.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ActionKind, Error, MessageId, Result};

/// Business-level status tagged onto every processed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// The outbound call completed.
    #[serde(rename = "OK")]
    Ok,
    /// The outbound call, or the dispatch preceding it, failed.
    Error,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error => f.write_str("Error"),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Flags recognised on inbound messages that steer dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ControlFlags {
    /// Onboard again even when the agent is already onboarded.
    #[serde(rename = "_forceOnBoard", default, skip_serializing_if = "is_false")]
    pub force_onboard: bool,
    /// Refetch the data source configuration.
    #[serde(rename = "_forceGetConfig", default, skip_serializing_if = "is_false")]
    pub force_get_config: bool,
    /// Attach the current access token to the forwarded message.
    #[serde(
        rename = "_includeMindSphereToken",
        default,
        skip_serializing_if = "is_false"
    )]
    pub include_token: bool,
    /// Only generate the data lake upload URL; skip the upload itself.
    #[serde(rename = "_ignorePayload", default, skip_serializing_if = "is_false")]
    pub ignore_payload: bool,
    /// Treat the payload as an event even if it does not match the event schema.
    #[serde(rename = "_customEvent", default, skip_serializing_if = "is_false")]
    pub custom_event: bool,
}

/// Result fields attached to a message once it has been processed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(
        rename = "_mindsphereStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    status: Option<RequestStatus>,
    #[serde(
        rename = "_mindsphereRequestCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    request_count: Option<u64>,
    #[serde(rename = "_error", default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(rename = "_errorObject", default, skip_serializing_if = "Option::is_none")]
    error_object: Option<Value>,
    #[serde(rename = "_signedUrl", default, skip_serializing_if = "Option::is_none")]
    signed_url: Option<String>,
    #[serde(
        rename = "_mindsphereToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    token: Option<String>,
}

impl Outcome {
    /// Returns the business status, if one has been set.
    #[must_use]
    pub const fn status(&self) -> Option<RequestStatus> {
        self.status
    }

    /// Returns the request sequence number recorded on failure.
    #[must_use]
    pub const fn request_count(&self) -> Option<u64> {
        self.request_count
    }

    /// Returns the timestamped error text.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the structured error object.
    #[must_use]
    pub fn error_object(&self) -> Option<&Value> {
        self.error_object.as_ref()
    }

    /// Returns the signed data lake upload URL.
    #[must_use]
    pub fn signed_url(&self) -> Option<&str> {
        self.signed_url.as_deref()
    }

    /// Returns the access token attached on request.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// An inbound unit of work, augmented in place with result fields.
///
/// Unknown top-level fields (`topic`, `_msgid`, ...) are preserved as
/// correlation fields and travel with the message when it is forwarded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    payload: Value,
    #[serde(rename = "_time", default, skip_serializing_if = "Option::is_none")]
    time: Option<Value>,
    #[serde(flatten)]
    flags: ControlFlags,
    #[serde(flatten)]
    outcome: Outcome,
    #[serde(flatten)]
    correlation: Map<String, Value>,
}

impl Message {
    /// Creates a message carrying the supplied payload.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Creates a synthetic action message such as the periodic await and renew signals.
    #[must_use]
    pub fn action(kind: ActionKind, at: DateTime<Utc>) -> Self {
        let payload = serde_json::json!({
            "action": kind.as_str(),
            "timestamp": at.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        Self::new(payload).with_correlation("_msgid", Value::String(MessageId::random().to_string()))
    }

    /// Decodes a message from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] when the value is not a message object.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encodes the message, including result fields, as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] if serialisation fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Sets the explicit timestamp override (`_time`).
    #[must_use]
    pub fn with_time(mut self, time: Value) -> Self {
        self.time = Some(time);
        self
    }

    /// Replaces the control flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds a correlation field that is forwarded untouched.
    #[must_use]
    pub fn with_correlation(mut self, key: impl Into<String>, value: Value) -> Self {
        self.correlation.insert(key.into(), value);
        self
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the payload for in-place modification.
    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    /// Replaces the payload.
    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    /// Returns the control flags.
    #[must_use]
    pub const fn flags(&self) -> ControlFlags {
        self.flags
    }

    /// Returns the result fields.
    #[must_use]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Returns the correlation fields.
    #[must_use]
    pub fn correlation(&self) -> &Map<String, Value> {
        &self.correlation
    }

    /// Returns the business status, if one has been set.
    #[must_use]
    pub const fn status(&self) -> Option<RequestStatus> {
        self.outcome.status
    }

    /// Returns `true` when the message has been tagged with an error status.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.outcome.status == Some(RequestStatus::Error)
    }

    /// Resolves the instant this message should be posted at.
    ///
    /// Without an override the supplied wall-clock time is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] when `_time` is present but is not an
    /// RFC 3339 instant.
    pub fn resolve_timestamp(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match &self.time {
            None => Ok(now),
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| Error::InvalidTimestamp { value: raw.clone() }),
            Some(other) => Err(Error::InvalidTimestamp {
                value: other.to_string(),
            }),
        }
    }

    /// Tags the message as successfully processed.
    pub fn mark_ok(&mut self) {
        self.outcome.status = Some(RequestStatus::Ok);
    }

    /// Sets the business status without attaching an error.
    pub fn set_status(&mut self, status: RequestStatus) {
        self.outcome.status = Some(status);
    }

    /// Tags the message as failed, attaching the error text and object.
    ///
    /// The text is prefixed with the failure instant, as downstream consumers expect.
    pub fn mark_error(&mut self, at: DateTime<Utc>, text: &str, object: Value) {
        self.outcome.status = Some(RequestStatus::Error);
        self.outcome.error = Some(format!(
            "{} {text}",
            at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        self.outcome.error_object = Some(object);
    }

    /// Records the request sequence number of the failed operation.
    pub fn set_request_count(&mut self, count: u64) {
        self.outcome.request_count = Some(count);
    }

    /// Attaches the signed upload URL.
    pub fn set_signed_url(&mut self, url: impl Into<String>) {
        self.outcome.signed_url = Some(url.into());
    }

    /// Attaches the agent access token.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.outcome.token = Some(token.into());
    }
}
