//! Core shared types for the MindConnect bridge.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod message;
mod payload;

/// Error type and result alias shared across the bridge.
pub use error::{Error, Result};
/// Identifiers used for entities and synthetic messages.
pub use ids::{EntityId, MessageId};
/// Inbound message envelope, control flags and outcome fields.
pub use message::{ControlFlags, Message, Outcome, RequestStatus};
/// Typed payload shapes accepted by the dispatch engine.
pub use payload::{
    ActionKind, ActionRequest, BinaryContent, BulkEntry, BulkValue, DataLakeFileInfo, DataPoint,
    Event, FileInfo, FileSource, SdkOperation,
};
