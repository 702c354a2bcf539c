//! Schema documents for every payload kind.
//!
//! The schemas are deliberately structural: they decide which operation a payload
//! is routed to, while the backend remains responsible for semantic validation.

use serde_json::{Value, json};

fn entity_id() -> Value {
    json!({
        "type": "string",
        "minLength": 32,
        "maxLength": 32,
        "pattern": "^[A-Fa-f0-9]*$"
    })
}

fn string_or_buffer() -> Value {
    json!({
        "oneOf": [
            { "type": "string" },
            {
                "type": "object",
                "required": ["type", "data"],
                "properties": {
                    "type": { "const": "Buffer" },
                    "data": {
                        "type": "array",
                        "items": { "type": "integer", "minimum": 0, "maximum": 255 }
                    }
                }
            }
        ]
    })
}

fn numeric_string() -> Value {
    json!({ "type": "string", "pattern": "^[0-9]+$" })
}

/// `{ action: "await" | "renew", timestamp }`.
#[must_use]
pub fn action() -> Value {
    json!({
        "type": "object",
        "required": ["action", "timestamp"],
        "properties": {
            "action": { "type": "string", "enum": ["await", "renew"] },
            "timestamp": { "type": "string", "format": "date-time" }
        }
    })
}

/// Domain event.
#[must_use]
pub fn event() -> Value {
    json!({
        "type": "object",
        "required": ["timestamp", "severity", "description", "source", "sourceId", "sourceType"],
        "properties": {
            "entityId": entity_id(),
            "timestamp": { "type": "string", "format": "date-time" },
            "sourceType": { "type": "string" },
            "sourceId": { "type": "string" },
            "source": { "type": "string" },
            "severity": { "type": "integer" },
            "description": { "type": "string" }
        }
    })
}

/// File upload to an asset.
#[must_use]
pub fn file_upload() -> Value {
    json!({
        "type": "object",
        "required": ["fileName", "description"],
        "properties": {
            "entityId": entity_id(),
            "fileName": string_or_buffer(),
            "filePath": { "type": "string" },
            "fileType": { "type": "string" },
            "description": { "type": "string" }
        }
    })
}

/// File upload to the data lake.
#[must_use]
pub fn data_lake_file_upload() -> Value {
    json!({
        "type": "object",
        "required": ["dataLakeFile", "dataLakeFilePath"],
        "properties": {
            "dataLakeFile": string_or_buffer(),
            "dataLakeFilePath": { "type": "string", "minLength": 1 },
            "subTenantId": { "type": "string" }
        }
    })
}

/// Enumerated backend query.
#[must_use]
pub fn sdk_operation() -> Value {
    json!({
        "type": "object",
        "required": ["sdkOperation"],
        "properties": {
            "sdkOperation": {
                "type": "string",
                "enum": ["getAsset", "getDataSourceConfiguration", "getDataMappings"]
            },
            "assetId": { "type": "string" },
            "includeShared": { "type": "boolean" },
            "propertyNames": { "type": "array", "items": { "type": "string" } }
        },
        "if": { "properties": { "sdkOperation": { "const": "getAsset" } } },
        "then": { "required": ["assetId"] }
    })
}

/// Bulk time series upload.
#[must_use]
pub fn bulk_time_series() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "required": ["timestamp", "values"],
            "properties": {
                "timestamp": { "type": "string" },
                "values": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "dataPointId": { "type": "string" },
                            "qualityCode": { "type": "string" },
                            "value": { "type": "string" }
                        }
                    }
                }
            }
        }
    })
}

/// Time series upload.
#[must_use]
pub fn time_series() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "required": ["dataPointId", "qualityCode", "value"],
            "properties": {
                "dataPointId": { "type": "string" },
                "qualityCode": { "type": "string" },
                "value": { "type": "string" }
            }
        }
    })
}

/// Remote reconfiguration of the node.
#[must_use]
pub fn reconfiguration() -> Value {
    json!({
        "type": "object",
        "required": [
            "name", "configtype", "agentconfig", "privatekey", "model", "validate",
            "validateevent", "chunk", "disablekeepalive", "retry", "asyncduration"
        ],
        "properties": {
            "name": { "type": "string" },
            "configtype": { "type": "string" },
            "agentconfig": {
                "type": "object",
                "required": ["content", "expiration"],
                "properties": {
                    "content": {
                        "type": "object",
                        "required": ["baseUrl", "iat", "clientCredentialProfile", "clientId", "tenant"],
                        "properties": {
                            "baseUrl": { "type": "string" },
                            "iat": { "type": "string" },
                            "clientCredentialProfile": {
                                "type": "array",
                                "items": { "type": "string" }
                            },
                            "clientId": { "type": "string" },
                            "tenant": { "type": "string" }
                        }
                    },
                    "expiration": { "type": "string" }
                }
            },
            "privatekey": { "type": "string" },
            "model": { "type": "string" },
            "validate": { "type": "boolean" },
            "validateevent": { "type": "boolean" },
            "chunk": { "type": "boolean" },
            "disablekeepalive": { "type": "boolean" },
            "retry": numeric_string(),
            "parallel": numeric_string(),
            "asyncduration": numeric_string(),
            "emitcontrol": { "type": "boolean" },
            "datalakeonly": { "type": "boolean" },
            "supressverbosity": { "type": "boolean" }
        }
    })
}
