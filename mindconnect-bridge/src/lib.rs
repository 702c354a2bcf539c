//! Message classification and dispatch bridge facade.
//!
//! Depend on this crate via `cargo add mindconnect-bridge`. It bundles the
//! bridge crates behind feature flags so hosts can pull in only the pieces they
//! wire up themselves, for example just the classifier.

#![warn(missing_docs, clippy::pedantic)]

/// Message envelope and typed payloads.
pub use bridge_primitives as primitives;

/// Payload classification (enabled by `schema` feature).
#[cfg(feature = "schema")]
pub use bridge_schema as schema;

/// Node configuration and agent settings (enabled by `config` feature).
#[cfg(feature = "config")]
pub use bridge_config as config;

/// Status reporting and tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use bridge_telemetry as telemetry;

/// Agent capability and flow store adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use bridge_adapters as adapters;

/// Dispatch engine and runner (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use bridge_kernel as kernel;
