//! Typed payload shapes.
//!
//! Payloads arrive as free-form JSON and are classified structurally first; these
//! types are the decoded form each operation works with afterwards.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EntityId, Result};

/// Control actions understood by the dispatch engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Drain the in-flight batch now.
    Await,
    /// Renew the agent access token.
    Renew,
}

impl ActionKind {
    /// Returns the wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Await => "await",
            Self::Renew => "renew",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ action, timestamp }` control payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Requested action.
    pub action: ActionKind,
    /// Instant the action was requested at.
    pub timestamp: String,
}

/// A single time-series value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    /// Data point identifier from the data source configuration.
    pub data_point_id: String,
    /// Quality code reported with the value.
    pub quality_code: String,
    /// Value rendered as a string.
    pub value: String,
}

/// A value inside a bulk upload entry. All fields are optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkValue {
    /// Data point identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_point_id: Option<String>,
    /// Quality code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_code: Option<String>,
    /// Value rendered as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One timestamped set of values in a bulk upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkEntry {
    /// Instant the values were taken at.
    pub timestamp: String,
    /// Values recorded at `timestamp`.
    pub values: Vec<BulkValue>,
}

/// A domain event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Target entity; defaults to the agent itself when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Instant the event occurred at.
    pub timestamp: String,
    /// Kind of source that raised the event.
    pub source_type: String,
    /// Identifier of the source.
    pub source_id: String,
    /// Human-readable source name.
    pub source: String,
    /// Severity level.
    pub severity: i64,
    /// Event description.
    pub description: String,
    /// Additional custom event fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Marker for the `type` field of a serialised binary buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferTag {
    /// The only tag value in use.
    Buffer,
}

/// Raw binary content in its JSON form: `{ "type": "Buffer", "data": [..] }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryContent {
    #[serde(rename = "type")]
    tag: BufferTag,
    data: Bytes,
}

impl BinaryContent {
    /// Wraps the supplied bytes.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            tag: BufferTag::Buffer,
            data: data.into(),
        }
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

/// A file referenced by path or carried inline as binary content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSource {
    /// Inline binary content.
    Binary(BinaryContent),
    /// Path of a file on the local filesystem.
    Path(String),
}

impl FileSource {
    /// Returns `true` when the content is carried inline.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Short description used in status texts.
    #[must_use]
    pub fn describe(&self) -> &str {
        match self {
            Self::Binary(_) => "Buffer",
            Self::Path(path) => path,
        }
    }
}

/// Upload of a file to an asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Target entity; defaults to the agent itself when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// File path or inline content.
    pub file_name: FileSource,
    /// Remote file path; required when `file_name` is binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// MIME type of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// File description.
    pub description: String,
}

/// Upload of a file to the data lake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLakeFileInfo {
    /// File path or inline content.
    pub data_lake_file: FileSource,
    /// Path below the agent's data lake folder.
    pub data_lake_file_path: String,
    /// Sub-tenant the upload is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tenant_id: Option<String>,
}

/// Fixed set of backend queries that may be requested through a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sdkOperation", rename_all = "camelCase")]
pub enum SdkOperation {
    /// Reads an asset, optionally reduced to selected properties.
    #[serde(rename_all = "camelCase")]
    GetAsset {
        /// Asset to read.
        asset_id: String,
        /// Include assets shared with the tenant.
        #[serde(default)]
        include_shared: bool,
        /// Properties to keep; all are kept when empty.
        #[serde(default)]
        property_names: Vec<String>,
    },
    /// Reads the agent's data source configuration.
    GetDataSourceConfiguration,
    /// Reads the agent's data mappings.
    GetDataMappings,
}

impl SdkOperation {
    /// Returns the wire name of the operation.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetAsset { .. } => "getAsset",
            Self::GetDataSourceConfiguration => "getDataSourceConfiguration",
            Self::GetDataMappings => "getDataMappings",
        }
    }
}

/// Decodes a typed payload from a message payload.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(T::deserialize(value)?)
}

macro_rules! impl_from_payload {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                /// Decodes this shape from a message payload.
                ///
                /// # Errors
                ///
                /// Returns [`crate::Error::InvalidPayload`] when the payload does not have this shape.
                pub fn from_payload(value: &Value) -> Result<Self> {
                    decode(value)
                }
            }
        )*
    };
}

impl_from_payload!(
    ActionRequest,
    Event,
    FileInfo,
    DataLakeFileInfo,
    SdkOperation,
);

impl DataPoint {
    /// Decodes a list of data points from a message payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPayload`] when the payload is not a data point array.
    pub fn list_from_payload(value: &Value) -> Result<Vec<Self>> {
        decode(value)
    }
}

impl BulkEntry {
    /// Decodes a list of bulk entries from a message payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPayload`] when the payload is not a bulk entry array.
    pub fn list_from_payload(value: &Value) -> Result<Vec<Self>> {
        decode(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn file_source_accepts_buffer_or_path() {
        let binary: FileSource =
            serde_json::from_value(json!({"type": "Buffer", "data": [1, 2, 3]})).unwrap();
        assert!(binary.is_binary());
        assert_eq!(binary.describe(), "Buffer");

        let path: FileSource = serde_json::from_value(json!("/tmp/a.txt")).unwrap();
        assert_eq!(path, FileSource::Path("/tmp/a.txt".into()));
    }

    #[test]
    fn event_keeps_custom_fields() {
        let event = Event::from_payload(&json!({
            "timestamp": "2020-01-01T00:00:00Z",
            "sourceType": "Agent",
            "sourceId": "application",
            "source": "Meowz",
            "severity": 30,
            "description": "Event sent at 2020",
            "temperature": 21,
        }))
        .unwrap();

        assert!(event.entity_id.is_none());
        assert_eq!(event.extra.get("temperature"), Some(&json!(21)));
    }

    #[test]
    fn sdk_operation_is_tagged_by_name() {
        let op = SdkOperation::from_payload(&json!({
            "sdkOperation": "getAsset",
            "assetId": "a1",
            "propertyNames": ["name"],
        }))
        .unwrap();

        assert_eq!(
            op,
            SdkOperation::GetAsset {
                asset_id: "a1".into(),
                include_shared: false,
                property_names: vec!["name".into()],
            }
        );
        assert!(SdkOperation::from_payload(&json!({"sdkOperation": "eval"})).is_err());
    }
}
