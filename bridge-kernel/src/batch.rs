//! Bounded set of outstanding operations.

use std::fmt;
use std::time::Duration;

use bridge_primitives::Message;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

/// Observed state of one submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Still running.
    Pending,
    /// Completed and tagged `OK` (or untagged).
    Fulfilled,
    /// Completed, but the message carries `_mindsphereStatus: "Error"`.
    FulfilledWithApplicationError,
    /// The task itself failed (panicked or was cancelled).
    Rejected,
}

enum Entry {
    Running(JoinHandle<Message>),
    Settled(Result<Message, String>),
}

impl Entry {
    fn state(&self) -> EntryState {
        match self {
            Self::Running(_) => EntryState::Pending,
            Self::Settled(Ok(message)) if message.is_error() => {
                EntryState::FulfilledWithApplicationError
            }
            Self::Settled(Ok(_)) => EntryState::Fulfilled,
            Self::Settled(Err(_)) => EntryState::Rejected,
        }
    }

    fn poll_finished(&mut self) {
        if let Self::Running(handle) = self {
            if handle.is_finished() {
                if let Some(result) = handle.now_or_never() {
                    *self = Self::Settled(result.map_err(|err| err.to_string()));
                }
            }
        }
    }
}

/// Aggregate counts produced by a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Entries in the batch when the drain started.
    pub requests: usize,
    /// Entries that completed with an `OK` message.
    pub success: usize,
    /// Entries that failed or completed with an `Error` message.
    pub errors: usize,
    /// Entries still running; they stay in the batch.
    pub pending: usize,
}

impl BatchSummary {
    /// Builds the message forwarded on the `control` topic.
    #[must_use]
    pub fn to_control_message(&self) -> Message {
        Message::new(self.to_value()).with_correlation("topic", json!("control"))
    }

    /// Encodes the counts as JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "requests": self.requests,
            "success": self.success,
            "errors": self.errors,
            "pending": self.pending,
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests: {} successful, {} errors, {} pending",
            self.requests, self.success, self.errors, self.pending
        )
    }
}

/// Operations submitted since the last drain.
///
/// Dropping an entry detaches its task; the operation keeps running but is no
/// longer counted.
#[derive(Default)]
pub struct InFlightBatch {
    entries: Vec<Entry>,
}

impl fmt::Debug for InFlightBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightBatch")
            .field("entries", &self.entries.len())
            .field("pending", &self.pending())
            .finish()
    }
}

impl InFlightBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a running operation.
    pub fn submit(&mut self, handle: JoinHandle<Message>) {
        self.entries.push(Entry::Running(handle));
    }

    /// Adds an operation that completed synchronously.
    pub fn submit_settled(&mut self, message: Message) {
        self.entries.push(Entry::Settled(Ok(message)));
    }

    /// Number of entries, settled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been submitted since the last drain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Running(handle) if !handle.is_finished()))
            .count()
    }

    /// Returns the state of every entry in submission order.
    #[must_use]
    pub fn states(&mut self) -> Vec<EntryState> {
        self.entries.iter_mut().for_each(Entry::poll_finished);
        self.entries.iter().map(Entry::state).collect()
    }

    /// Waits up to `limit` for the running entries to finish.
    pub async fn settle(&mut self, limit: Duration) {
        let entries = &mut self.entries;
        let waited = timeout(limit, async move {
            for entry in entries.iter_mut() {
                if let Entry::Running(handle) = entry {
                    let result = handle.await;
                    *entry = Entry::Settled(result.map_err(|err| err.to_string()));
                }
            }
        })
        .await;

        if waited.is_err() {
            debug!(?limit, "batch still pending after wait limit");
        }
    }

    /// Counts every entry and removes the settled ones.
    pub fn drain(&mut self) -> BatchSummary {
        let mut summary = BatchSummary {
            requests: self.entries.len(),
            ..BatchSummary::default()
        };

        for entry in &mut self.entries {
            entry.poll_finished();
            match entry.state() {
                EntryState::Pending => summary.pending += 1,
                EntryState::Fulfilled => summary.success += 1,
                EntryState::FulfilledWithApplicationError | EntryState::Rejected => {
                    summary.errors += 1;
                }
            }
        }

        self.entries.retain(|entry| matches!(entry, Entry::Running(_)));
        summary
    }

    /// Forgets every entry without waiting for it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use bridge_primitives::RequestStatus;
    use tokio::sync::oneshot;

    use super::*;

    fn message(status: RequestStatus) -> Message {
        let mut message = Message::new(json!([]));
        message.set_status(status);
        message
    }

    #[tokio::test]
    async fn application_errors_count_as_errors() {
        let mut batch = InFlightBatch::new();
        batch.submit(tokio::spawn(async { message(RequestStatus::Ok) }));
        batch.submit(tokio::spawn(async { message(RequestStatus::Error) }));
        batch.submit_settled(message(RequestStatus::Error));

        batch.settle(Duration::from_secs(1)).await;
        let summary = batch.drain();

        assert_eq!(
            summary,
            BatchSummary {
                requests: 3,
                success: 1,
                errors: 2,
                pending: 0
            }
        );
        assert!(batch.is_empty());
    }

    fn explode() -> Message {
        panic!("operation blew up")
    }

    #[tokio::test]
    async fn panicked_tasks_are_rejected() {
        let mut batch = InFlightBatch::new();
        batch.submit(tokio::spawn(async { explode() }));

        batch.settle(Duration::from_secs(1)).await;
        assert_eq!(batch.states(), vec![EntryState::Rejected]);
        assert_eq!(batch.drain().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_entries_survive_the_drain() {
        let (release, wait) = oneshot::channel::<()>();
        let mut batch = InFlightBatch::new();
        batch.submit(tokio::spawn(async { message(RequestStatus::Ok) }));
        batch.submit(tokio::spawn(async move {
            let _ = wait.await;
            message(RequestStatus::Ok)
        }));

        batch.settle(Duration::from_millis(50)).await;
        let summary = batch.drain();
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(batch.len(), 1);

        release.send(()).unwrap();
        batch.settle(Duration::from_millis(50)).await;
        let summary = batch.drain();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.pending, 0);
        assert!(batch.is_empty());
    }

    #[test]
    fn control_message_uses_control_topic() {
        let summary = BatchSummary {
            requests: 4,
            success: 3,
            errors: 1,
            pending: 0,
        };
        let value = summary.to_control_message().to_value().unwrap();
        assert_eq!(value["topic"], json!("control"));
        assert_eq!(value["payload"]["errors"], json!(1));
        assert_eq!(summary.to_string(), "4 requests: 3 successful, 1 errors, 0 pending");
    }
}
