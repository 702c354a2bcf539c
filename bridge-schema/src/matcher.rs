//! Compiled schema matchers.

use std::fmt;

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

use crate::schemas;

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors produced while compiling schemas.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A schema document could not be compiled.
    #[error("invalid {kind} schema: {reason}")]
    InvalidSchema {
        /// Schema that failed to compile.
        kind: SchemaKind,
        /// Compiler message.
        reason: String,
    },
}

/// Every schema a payload can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// `{ action, timestamp }` control messages.
    Action,
    /// Domain events.
    Event,
    /// File uploads to an asset.
    FileUpload,
    /// File uploads to the data lake.
    DataLakeFileUpload,
    /// Enumerated backend queries.
    SdkOperation,
    /// Bulk time series.
    BulkTimeSeries,
    /// Time series.
    TimeSeries,
    /// Remote reconfiguration.
    Reconfiguration,
}

impl SchemaKind {
    /// Classification order. Earlier kinds win when several schemas accept a payload.
    pub const PRECEDENCE: [Self; 7] = [
        Self::Action,
        Self::Event,
        Self::FileUpload,
        Self::DataLakeFileUpload,
        Self::SdkOperation,
        Self::BulkTimeSeries,
        Self::TimeSeries,
    ];

    /// Returns a short, stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Event => "event",
            Self::FileUpload => "file",
            Self::DataLakeFileUpload => "data lake file",
            Self::SdkOperation => "sdk operation",
            Self::BulkTimeSeries => "bulk time series",
            Self::TimeSeries => "time series",
            Self::Reconfiguration => "remote configuration",
        }
    }

    fn document(self) -> Value {
        match self {
            Self::Action => schemas::action(),
            Self::Event => schemas::event(),
            Self::FileUpload => schemas::file_upload(),
            Self::DataLakeFileUpload => schemas::data_lake_file_upload(),
            Self::SdkOperation => schemas::sdk_operation(),
            Self::BulkTimeSeries => schemas::bulk_time_series(),
            Self::TimeSeries => schemas::time_series(),
            Self::Reconfiguration => schemas::reconfiguration(),
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled schema for one [`SchemaKind`].
pub struct SchemaMatcher {
    kind: SchemaKind,
    validator: Validator,
}

impl fmt::Debug for SchemaMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaMatcher")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SchemaMatcher {
    /// Compiles the built-in schema for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidSchema`] when the schema does not compile.
    pub fn new(kind: SchemaKind) -> SchemaResult<Self> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&kind.document())
            .map_err(|err| SchemaError::InvalidSchema {
                kind,
                reason: err.to_string(),
            })?;
        Ok(Self { kind, validator })
    }

    /// Returns the kind this matcher recognises.
    #[must_use]
    pub const fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// Returns `true` when the payload satisfies the schema.
    #[must_use]
    pub fn matches(&self, payload: &Value) -> bool {
        self.validator.is_valid(payload)
    }

    /// Returns every validation error for the payload; empty when it matches.
    #[must_use]
    pub fn errors(&self, payload: &Value) -> Vec<String> {
        self.validator
            .iter_errors(payload)
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path} {err}")
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn matcher(kind: SchemaKind) -> SchemaMatcher {
        SchemaMatcher::new(kind).expect("schema compiles")
    }

    #[test]
    fn all_schemas_compile() {
        for kind in SchemaKind::PRECEDENCE {
            assert_eq!(matcher(kind).kind(), kind);
        }
        matcher(SchemaKind::Reconfiguration);
    }

    #[test]
    fn event_requires_every_descriptive_field() {
        let events = matcher(SchemaKind::Event);
        let event = json!({
            "entityId": "d72262e71ea0470eb9f880176b888938",
            "timestamp": "2018-11-15T17:31:35.000Z",
            "sourceType": "Agent",
            "sourceId": "application",
            "source": "Meowz",
            "severity": 30,
            "description": "Event sent at 2018"
        });
        assert!(events.matches(&event));
        assert!(!events.matches(&json!({"sourceType": "Agent"})));
        assert!(!events.matches(&json!({"event": event})));

        let mut bad_entity = event.clone();
        bad_entity["entityId"] = json!("xyz");
        assert!(!events.matches(&bad_entity));

        let mut bad_time = event;
        bad_time["timestamp"] = json!("last tuesday");
        assert!(!events.matches(&bad_time));
    }

    #[test]
    fn file_info_requires_name_and_description() {
        let files = matcher(SchemaKind::FileUpload);
        let mut info = json!({
            "entityId": "1234567890abcdef1234567890abcdef",
            "fileName": "package.json",
            "fileType": "application/json",
            "description": "testfile"
        });
        assert!(files.matches(&info));
        assert!(!files.matches(&json!({})));

        info["fileName"] = json!({"type": "Buffer", "data": [104, 105]});
        assert!(files.matches(&info));

        info.as_object_mut().unwrap().remove("description");
        assert!(!files.matches(&info));
    }

    #[test]
    fn time_series_and_bulk_reject_near_misses() {
        let series = matcher(SchemaKind::TimeSeries);
        let bulk = matcher(SchemaKind::BulkTimeSeries);

        let points = json!([{"dataPointId": "123", "qualityCode": "1", "value": "33.5"}]);
        assert!(series.matches(&points));
        assert!(!series.matches(&json!([{"xdataPointId": "123", "qualityCode": "1", "value": "33.5"}])));
        assert!(!series.matches(&json!([])));

        let entries = json!([{"timestamp": "2020-01-01T00:00:00Z", "values": points}]);
        assert!(bulk.matches(&entries));
        assert!(!bulk.matches(&json!([{"timeSTAMP": "2020-01-01T00:00:00Z", "values": []}])));
        assert!(!bulk.matches(&points));
    }

    #[test]
    fn actions_are_enumerated() {
        let actions = matcher(SchemaKind::Action);
        assert!(actions.matches(&json!({"action": "await", "timestamp": "2020-01-01T00:00:00Z"})));
        assert!(actions.matches(&json!({"action": "renew", "timestamp": "2020-01-01T00:00:00Z"})));
        assert!(!actions.matches(&json!({"action": ""})));
        assert!(!actions.matches(
            &json!({"action": "non-existing-action", "timestamp": "2020-01-01T00:00:00Z"})
        ));
    }

    #[test]
    fn reconfiguration_requires_numeric_strings() {
        let reconfig = matcher(SchemaKind::Reconfiguration);
        let mut payload = json!({
            "name": "testNode",
            "configtype": "SHARED_SECRET",
            "validate": true,
            "validateevent": false,
            "agentconfig": {
                "content": {
                    "baseUrl": "https://southgate.eu1.mindsphere.io",
                    "iat": "eyJraW...a1",
                    "clientCredentialProfile": ["SHARED_SECRET"],
                    "clientId": "d72262e71ea0470eb9f880176b888938",
                    "tenant": "castidev"
                },
                "expiration": "2018-11-15T17:31:35.000Z"
            },
            "privatekey": "",
            "model": "",
            "chunk": false,
            "disablekeepalive": false,
            "retry": "7091",
            "asyncduration": "23"
        });
        assert!(reconfig.matches(&payload));

        payload["retry"] = json!("0xa7");
        assert!(!reconfig.matches(&payload));

        payload["retry"] = json!("7");
        payload.as_object_mut().unwrap().remove("asyncduration");
        assert!(!reconfig.matches(&payload));

        assert!(!reconfig.matches(&json!({})));
        assert!(!reconfig.matches(&json!([{}])));
        assert!(!reconfig.matches(&json!({"name": "testNode", "validate": true, "agentconfig": {}})));
    }

    #[test]
    fn errors_are_reported_for_each_violation() {
        let series = matcher(SchemaKind::TimeSeries);
        let errors = series.errors(&json!([{"dataPointId": 1}]));
        assert!(errors.len() >= 2);
        assert!(series.errors(&json!([{"dataPointId": "1", "qualityCode": "0", "value": "1"}])).is_empty());
    }
}
