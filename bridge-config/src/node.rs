//! Declarative node configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AgentCredentials, ConfigError, ConfigResult};

/// Identity of the node inside the host's flow graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    node_id: String,
    flow_id: String,
}

impl NodeIdentity {
    /// Creates an identity from the node and owning flow identifiers.
    #[must_use]
    pub fn new(node_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            flow_id: flow_id.into(),
        }
    }

    /// Returns the node identifier.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns the identifier of the flow that owns the node.
    #[must_use]
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }
}

/// Numeric setting that may be written as a number or a decimal string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericSetting {
    /// JSON number.
    Number(u64),
    /// Decimal string such as `"7"`.
    Text(String),
}

impl NumericSetting {
    /// Resolves the value, treating an empty string as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the string is not a decimal integer.
    pub fn resolve(&self, field: &'static str) -> ConfigResult<Option<u64>> {
        match self {
            Self::Number(value) => Ok(Some(*value)),
            Self::Text(text) if text.trim().is_empty() => Ok(None),
            Self::Text(text) => text
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::invalid_field(field, format!("`{text}` is not a number"))),
        }
    }
}

impl From<u64> for NumericSetting {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

/// Agent configuration as an object, or as the JSON string the host stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentConfigSource {
    /// Structured document.
    Document(Box<AgentCredentials>),
    /// Serialised document.
    Text(String),
}

impl AgentConfigSource {
    /// Decodes the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] when the serialised document is not valid.
    pub fn credentials(&self) -> ConfigResult<AgentCredentials> {
        match self {
            Self::Document(credentials) => Ok(credentials.as_ref().clone()),
            Self::Text(text) => Ok(serde_json::from_str(text)?),
        }
    }

    /// Returns the serialised form stored in the host's flow definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the document cannot be serialised.
    pub fn to_json_string(&self) -> ConfigResult<String> {
        match self {
            Self::Document(credentials) => Ok(serde_json::to_string(credentials)?),
            Self::Text(text) => Ok(text.clone()),
        }
    }
}

/// Node configuration as delivered by the host or a reconfiguration request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct NodeConfig {
    /// Display name of the node.
    #[serde(default)]
    pub name: String,
    /// Credential type selected in the editor.
    #[serde(default)]
    pub configtype: String,
    /// Agent credentials.
    pub agentconfig: AgentConfigSource,
    /// PEM private key for the `RSA_3072` profile.
    #[serde(default)]
    pub privatekey: String,
    /// Cached data source model.
    #[serde(default)]
    pub model: String,
    /// Validate time series against the data source configuration.
    #[serde(default)]
    pub validate: bool,
    /// Validate events against their type.
    #[serde(default, rename = "validateevent")]
    pub validate_event: bool,
    /// Upload files in chunks.
    #[serde(default)]
    pub chunk: bool,
    /// Disable hourly token renewal.
    #[serde(default, rename = "disablekeepalive")]
    pub disable_keep_alive: bool,
    /// Attempts per outbound call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<NumericSetting>,
    /// Requests collected before the batch is drained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<NumericSetting>,
    /// Seconds between periodic drains.
    #[serde(default, rename = "asyncduration", skip_serializing_if = "Option::is_none")]
    pub async_duration: Option<NumericSetting>,
    /// Forward batch summaries as `control` topic messages.
    #[serde(default, rename = "emitcontrol")]
    pub emit_control: bool,
    /// Only data lake uploads are used; skip fetching the data source configuration.
    #[serde(default, rename = "datalakeonly")]
    pub data_lake_only: bool,
    /// Only report errors and retries as node status.
    #[serde(default, rename = "supressverbosity")]
    pub suppress_verbosity: bool,
}

impl NodeConfig {
    /// Decodes a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] when the value does not have the expected shape.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the fields copied into the host's flow node, with the agent
    /// configuration serialised to a string the way the host stores it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the configuration cannot be serialised.
    pub fn to_flow_fields(&self) -> ConfigResult<Map<String, Value>> {
        let mut fields = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert(
            "agentconfig".to_owned(),
            Value::String(self.agentconfig.to_json_string()?),
        );
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document() -> Value {
        json!({
            "name": "line-1",
            "configtype": "SHARED_SECRET",
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
            "validate": true,
            "validateevent": false,
            "chunk": false,
            "disablekeepalive": true,
            "retry": "7",
            "asyncduration": 23
        })
    }

    #[test]
    fn decodes_wire_names_and_mixed_numbers() {
        let config = NodeConfig::from_value(document()).unwrap();
        assert!(config.validate);
        assert!(config.disable_keep_alive);
        assert_eq!(config.retry.unwrap().resolve("retry").unwrap(), Some(7));
        assert_eq!(
            config.async_duration.unwrap().resolve("asyncduration").unwrap(),
            Some(23)
        );
        assert!(config.parallel.is_none());
    }

    #[test]
    fn agent_config_may_be_a_string() {
        let mut value = document();
        value["agentconfig"] = json!(value["agentconfig"].to_string());
        let config = NodeConfig::from_value(value).unwrap();
        assert!(matches!(config.agentconfig, AgentConfigSource::Text(_)));
        assert_eq!(
            config.agentconfig.credentials().unwrap().client_id(),
            "d72262e71ea0470eb9f880176b888938"
        );
    }

    #[test]
    fn flow_fields_store_agent_config_as_string() {
        let config = NodeConfig::from_value(document()).unwrap();
        let fields = config.to_flow_fields().unwrap();
        assert!(fields["agentconfig"].is_string());
        assert_eq!(fields["validateevent"], json!(false));
        assert_eq!(fields["retry"], json!("7"));
    }

    #[test]
    fn hex_strings_are_not_numbers() {
        let err = NumericSetting::Text("0xa7".into()).resolve("retry");
        assert!(matches!(err, Err(ConfigError::InvalidField { field: "retry", .. })));
        assert_eq!(NumericSetting::Text(String::new()).resolve("retry").unwrap(), None);
    }
}
