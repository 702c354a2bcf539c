//! Payload classification.
//!
//! Inbound payloads are matched against a fixed, ordered list of JSON schemas. The
//! first schema that accepts the payload decides its [`MessageKind`]; a payload
//! accepted by none of them is [`MessageKind::Unrecognized`] and carries a
//! [`ClassificationReport`] listing every schema's complaints.

#![warn(missing_docs, clippy::pedantic)]

mod classifier;
mod matcher;
mod report;
pub mod schemas;

pub use classifier::{MessageKind, PayloadClassifier};
pub use matcher::{SchemaError, SchemaKind, SchemaMatcher, SchemaResult};
pub use report::{ClassificationReport, UNRECOGNIZED_PAYLOAD};
