//! Configuration management for the bridge.
//!
//! [`NodeConfig`] is the declarative shape delivered by the host, and also the
//! payload of a remote reconfiguration request. It is validated once into an
//! immutable [`AgentSettings`] value, which is swapped wholesale rather than
//! edited in place.

#![warn(missing_docs, clippy::pedantic)]

mod credentials;
mod error;
mod node;
mod settings;

pub use credentials::{AgentCredentials, CredentialContent, RSA_3072_PROFILE, normalize_private_key};
pub use error::{ConfigError, ConfigResult};
pub use node::{AgentConfigSource, NodeConfig, NodeIdentity, NumericSetting};
pub use settings::{AgentSettings, AgentSettingsBuilder, KEEP_ALIVE_PERIOD};
