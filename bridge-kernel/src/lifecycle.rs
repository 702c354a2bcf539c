//! Lifecycle state machine for the dispatch engine.

use thiserror::Error;
use tracing::debug;

/// States the engine moves through while handling messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed but not started.
    Uninitialized,
    /// Waiting for the next message.
    Ready,
    /// A message was accepted and is being classified.
    Classifying,
    /// The matched operation was submitted to the batch.
    Executing,
    /// The batch was left running.
    BatchPending,
    /// The batch was drained.
    BatchDrained,
    /// Torn down; no further messages are accepted.
    Closed,
}

impl EngineState {
    /// Returns `true` once the engine has been closed.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` between accepting a message and returning to [`Ready`](Self::Ready).
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Classifying | Self::Executing | Self::BatchPending | Self::BatchDrained
        )
    }
}

/// Events that trigger lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Settings were applied and the engine can accept messages.
    Start,
    /// A message was accepted.
    Accept,
    /// The operation was submitted.
    Submit,
    /// The drain policy did not trigger.
    Hold,
    /// The drain policy triggered.
    Drain,
    /// Message handling finished.
    Complete,
    /// Message handling failed.
    Fail,
    /// The engine is torn down.
    Close,
}

/// Lifecycle state manager.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    state: EngineState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in [`EngineState::Uninitialized`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the event is not allowed
    /// from the current state.
    pub fn transition(&mut self, event: EngineEvent) -> LifecycleResult<EngineState> {
        use EngineEvent as Ev;
        use EngineState as St;

        let next = match (self.state, event) {
            (St::Uninitialized | St::Ready, Ev::Start)
            | (
                St::Classifying | St::Executing | St::BatchPending | St::BatchDrained,
                Ev::Fail,
            )
            | (St::Classifying | St::BatchPending | St::BatchDrained, Ev::Complete) => {
                Some(St::Ready)
            }
            (St::Ready, Ev::Accept) => Some(St::Classifying),
            (St::Classifying, Ev::Submit) => Some(St::Executing),
            (St::Classifying | St::Executing, Ev::Hold) => Some(St::BatchPending),
            (St::Classifying | St::Executing, Ev::Drain) => Some(St::BatchDrained),
            (_, Ev::Close) => Some(St::Closed),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(?self.state, ?next_state, ?event, "engine lifecycle transition");
            self.state = next_state;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid engine transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State prior to the attempted transition.
        from: EngineState,
        /// Event that triggered the failure.
        event: EngineEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trip_returns_to_ready() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(EngineEvent::Start).unwrap();

        for event in [EngineEvent::Accept, EngineEvent::Submit, EngineEvent::Drain] {
            lifecycle.transition(event).unwrap();
        }
        assert_eq!(lifecycle.state(), EngineState::BatchDrained);
        assert!(lifecycle.state().is_busy());

        lifecycle.transition(EngineEvent::Complete).unwrap();
        assert_eq!(lifecycle.state(), EngineState::Ready);
    }

    #[test]
    fn failure_recovers_from_any_busy_state() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(EngineEvent::Start).unwrap();
        lifecycle.transition(EngineEvent::Accept).unwrap();

        assert_eq!(
            lifecycle.transition(EngineEvent::Fail).unwrap(),
            EngineState::Ready
        );
    }

    #[test]
    fn messages_are_rejected_before_start_and_after_close() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle
            .transition(EngineEvent::Accept)
            .expect_err("accept should fail before start");
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: EngineState::Uninitialized,
                event: EngineEvent::Accept,
            }
        );

        lifecycle.transition(EngineEvent::Close).unwrap();
        assert!(lifecycle.state().is_closed());
        assert!(lifecycle.transition(EngineEvent::Accept).is_err());
        assert!(lifecycle.transition(EngineEvent::Start).is_err());
    }
}
