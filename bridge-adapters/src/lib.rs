//! External collaborators of the dispatch engine.
//!
//! The backend SDK is reached through the [`traits::AgentCapability`] interface and
//! the host's flow definitions through [`flow::FlowStore`]. [`dry_run`] provides an
//! agent that only logs, for local runs without backend credentials.

#![warn(missing_docs, clippy::pedantic)]

pub mod dry_run;
pub mod flow;
pub mod traits;

mod http_client;
