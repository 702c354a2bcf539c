//! Observability for the bridge.
//!
//! The dispatch engine never talks to its host directly. It reports through a
//! [`StatusReporter`], which shows node status, writes log lines and errors, and
//! forwards processed messages downstream.

#![warn(missing_docs, clippy::pedantic)]

mod reporter;
mod status;
mod subscriber;

pub use reporter::{ChannelReporter, CollectingReporter, StatusReporter, TracingReporter};
pub use status::{NodeStatus, StatusFill, StatusShape};
pub use subscriber::{TelemetryError, init_tracing};
