//! Runs a dispatch engine on its own task, driving the periodic actions.

use std::future::pending;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bridge_config::{AgentSettings, KEEP_ALIVE_PERIOD};
use bridge_primitives::{ActionKind, Message};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::admin::AdminQueries;
use crate::engine::DispatchEngine;

/// Sizing of the runner's inbound queue.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    inbound_capacity: NonZeroUsize,
}

impl RunnerConfig {
    /// Creates a configuration with the supplied queue capacity.
    #[must_use]
    pub const fn new(inbound_capacity: NonZeroUsize) -> Self {
        Self { inbound_capacity }
    }

    /// Returns the queue capacity.
    #[must_use]
    pub const fn inbound_capacity(self) -> NonZeroUsize {
        self.inbound_capacity
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(256).expect("non-zero"))
    }
}

/// Errors produced by the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The engine task has stopped and accepts no more messages.
    #[error("engine runner closed")]
    Closed,

    /// The engine task panicked or was cancelled.
    #[error("engine task failed: {reason}")]
    Join {
        /// Join error reported by tokio.
        reason: String,
    },
}

/// Handle to an engine running on its own task.
#[derive(Debug)]
pub struct EngineHandle {
    inbound: mpsc::Sender<Message>,
    shutdown: Arc<Notify>,
    admin: watch::Receiver<AdminQueries>,
    task: JoinHandle<DispatchEngine>,
}

impl EngineHandle {
    /// Returns a sender for inbound messages.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<Message> {
        self.inbound.clone()
    }

    /// Queues an inbound message, waiting for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Closed`] once the engine task has stopped.
    pub async fn send(&self, message: Message) -> Result<(), RunnerError> {
        self.inbound
            .send(message)
            .await
            .map_err(|_| RunnerError::Closed)
    }

    /// Returns admin queries bound to the engine's current agent.
    #[must_use]
    pub fn admin(&self) -> AdminQueries {
        self.admin.borrow().clone()
    }

    /// Closes the inbound queue and waits for the runner to dispatch everything
    /// already queued, then returns the closed engine.
    ///
    /// Senders obtained from [`EngineHandle::sender`] keep the runner alive
    /// until they are dropped too.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Join`] if the engine task panicked.
    pub async fn close(self) -> Result<DispatchEngine, RunnerError> {
        let Self { inbound, task, .. } = self;
        drop(inbound);
        task.await.map_err(|err| RunnerError::Join {
            reason: err.to_string(),
        })
    }

    /// Stops the runner, cancelling both timers, and returns the closed engine.
    ///
    /// Messages still queued are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Join`] if the engine task panicked.
    pub async fn shutdown(self) -> Result<DispatchEngine, RunnerError> {
        self.shutdown.notify_one();
        self.task.await.map_err(|err| RunnerError::Join {
            reason: err.to_string(),
        })
    }
}

/// Spawns `engine` with the default queue capacity.
#[must_use]
pub fn spawn_engine(engine: DispatchEngine) -> EngineHandle {
    spawn_engine_with(engine, RunnerConfig::default())
}

/// Spawns `engine` on a new task.
///
/// The task dispatches inbound messages in arrival order and, between them, the
/// periodic await and keep-alive actions. It stops when every sender is dropped
/// or [`EngineHandle::shutdown`] is called.
#[must_use]
pub fn spawn_engine_with(engine: DispatchEngine, config: RunnerConfig) -> EngineHandle {
    let (inbound, receiver) = mpsc::channel(config.inbound_capacity().get());
    let shutdown = Arc::new(Notify::new());
    let (admin_tx, admin) = watch::channel(engine.admin());
    let task = tokio::spawn(run(engine, receiver, Arc::clone(&shutdown), admin_tx));
    EngineHandle {
        inbound,
        shutdown,
        admin,
        task,
    }
}

struct Timers {
    drain: Option<Interval>,
    keep_alive: Option<Interval>,
}

impl Timers {
    fn for_settings(settings: Option<&AgentSettings>) -> Self {
        let Some(settings) = settings else {
            return Self {
                drain: None,
                keep_alive: None,
            };
        };
        Self {
            drain: Some(periodic(settings.async_duration())),
            keep_alive: settings.keep_alive().then(|| periodic(KEEP_ALIVE_PERIOD)),
        }
    }
}

fn periodic(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => pending().await,
    }
}

async fn run(
    mut engine: DispatchEngine,
    mut inbound: mpsc::Receiver<Message>,
    shutdown: Arc<Notify>,
    admin: watch::Sender<AdminQueries>,
) -> DispatchEngine {
    let mut generation = engine.generation();
    let mut timers = Timers::for_settings(engine.settings().as_deref());
    info!(node_id = engine.identity().node_id(), "engine runner started");

    loop {
        let message = tokio::select! {
            () = shutdown.notified() => break,
            received = inbound.recv() => match received {
                Some(message) => message,
                None => break,
            },
            _ = tick(&mut timers.drain) => Message::action(ActionKind::Await, Utc::now()),
            _ = tick(&mut timers.keep_alive) => Message::action(ActionKind::Renew, Utc::now()),
        };

        if let Err(err) = engine.dispatch(message).await {
            debug!(error = %err, "dispatch failed");
        }

        if engine.generation() != generation {
            generation = engine.generation();
            timers = Timers::for_settings(engine.settings().as_deref());
            admin.send_replace(engine.admin());
            debug!(generation, "timers rebuilt for new settings");
        }
    }

    if let Err(err) = engine.close() {
        warn!(error = %err, "engine close failed");
    }
    engine
}
