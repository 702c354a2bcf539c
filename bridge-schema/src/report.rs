use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::SchemaKind;

/// Headline of every classification report.
pub const UNRECOGNIZED_PAYLOAD: &str = "the payload was not recognized as an event, file or datapoints. See node help for proper msg.payload.formats (see msg._errorObject for all errors)";

/// Per-schema validation errors for a payload that matched no schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ClassificationReport {
    message: &'static str,
    action_errors: Vec<String>,
    event_errors: Vec<String>,
    file_errors: Vec<String>,
    data_lake_errors: Vec<String>,
    sdk_operation_errors: Vec<String>,
    bulk_errors: Vec<String>,
    time_series_errors: Vec<String>,
    remote_configuration_errors: Vec<String>,
}

impl ClassificationReport {
    pub(crate) fn new() -> Self {
        Self {
            message: UNRECOGNIZED_PAYLOAD,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, kind: SchemaKind, errors: Vec<String>) {
        let slot = match kind {
            SchemaKind::Action => &mut self.action_errors,
            SchemaKind::Event => &mut self.event_errors,
            SchemaKind::FileUpload => &mut self.file_errors,
            SchemaKind::DataLakeFileUpload => &mut self.data_lake_errors,
            SchemaKind::SdkOperation => &mut self.sdk_operation_errors,
            SchemaKind::BulkTimeSeries => &mut self.bulk_errors,
            SchemaKind::TimeSeries => &mut self.time_series_errors,
            SchemaKind::Reconfiguration => &mut self.remote_configuration_errors,
        };
        *slot = errors;
    }

    /// Returns the errors recorded for `kind`.
    #[must_use]
    pub fn errors_for(&self, kind: SchemaKind) -> &[String] {
        match kind {
            SchemaKind::Action => &self.action_errors,
            SchemaKind::Event => &self.event_errors,
            SchemaKind::FileUpload => &self.file_errors,
            SchemaKind::DataLakeFileUpload => &self.data_lake_errors,
            SchemaKind::SdkOperation => &self.sdk_operation_errors,
            SchemaKind::BulkTimeSeries => &self.bulk_errors,
            SchemaKind::TimeSeries => &self.time_series_errors,
            SchemaKind::Reconfiguration => &self.remote_configuration_errors,
        }
    }

    /// Returns the headline message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// Renders the report as the JSON object attached to `_errorObject`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.message.to_owned()))
    }
}
