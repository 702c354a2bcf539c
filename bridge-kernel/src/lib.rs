//! Dispatch engine for the MindConnect bridge.
//!
//! The kernel classifies inbound messages, runs the matched outbound operation
//! with linear-backoff retries, tracks the operations in a bounded in-flight
//! batch, and applies live reconfiguration through the host flow round-trip.
//! [`spawn_engine`] runs an engine on its own task together with the periodic
//! await and keep-alive actions.

#![warn(missing_docs, clippy::pedantic)]

mod admin;
mod batch;
mod engine;
mod lifecycle;
mod operations;
mod reconfigure;
mod retry;
mod runner;

#[cfg(test)]
mod test_support;

pub use admin::AdminQueries;
pub use batch::{BatchSummary, EntryState, InFlightBatch};
pub use engine::{
    DispatchEngine, DispatchEngineBuilder, DispatchError, DispatchOutcome, DispatchResult,
    PrerequisiteStep,
};
pub use lifecycle::{EngineEvent, EngineState, Lifecycle, LifecycleError, LifecycleResult};
pub use operations::{
    Operation, OperationContext, OperationError, OperationKind, OperationRegistry,
    OperationResult, PostBulkTimeSeries, PostEvent, PostTimeSeries, RenewToken, SdkCall,
    UploadDataLakeFile, UploadFile, execute,
};
pub use reconfigure::{
    ReconfigurationController, ReconfigurationDelays, ReloadCause, ReloadError,
};
pub use retry::{RETRY_BACKOFF_STEP, RetryError, RetryExecutor, RetryPolicy};
pub use runner::{EngineHandle, RunnerConfig, RunnerError, spawn_engine, spawn_engine_with};
