//! Reporter capability injected into the dispatch engine.

use std::sync::{Arc, Mutex};

use bridge_primitives::Message;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::NodeStatus;

/// Sink for everything the engine wants its host to see.
pub trait StatusReporter: Send + Sync {
    /// Updates the node status indicator.
    fn report_status(&self, status: NodeStatus);

    /// Writes an informational log line.
    fn log(&self, line: &str);

    /// Reports an error to the host.
    fn report_error(&self, error: &str);

    /// Sends a processed message to the output port.
    fn forward(&self, message: Message);
}

/// Reporter that writes everything to `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report_status(&self, status: NodeStatus) {
        info!(fill = ?status.fill(), shape = ?status.shape(), text = status.text(), "node status");
    }

    fn log(&self, line: &str) {
        info!("{line}");
    }

    fn report_error(&self, error: &str) {
        error!(error, "node error");
    }

    fn forward(&self, message: Message) {
        info!(
            status = ?message.status(),
            correlation = ?message.correlation(),
            "message forwarded"
        );
    }
}

/// Reporter that forwards messages into a channel and traces everything else.
#[derive(Debug)]
pub struct ChannelReporter {
    output: mpsc::UnboundedSender<Message>,
    tracing: TracingReporter,
}

impl ChannelReporter {
    /// Creates a reporter and the receiving end of its output port.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (output, receiver) = mpsc::unbounded_channel();
        let reporter = Arc::new(Self {
            output,
            tracing: TracingReporter,
        });
        (reporter, receiver)
    }
}

impl StatusReporter for ChannelReporter {
    fn report_status(&self, status: NodeStatus) {
        self.tracing.report_status(status);
    }

    fn log(&self, line: &str) {
        self.tracing.log(line);
    }

    fn report_error(&self, error: &str) {
        self.tracing.report_error(error);
    }

    fn forward(&self, message: Message) {
        if self.output.send(message).is_err() {
            warn!("output port closed; dropping forwarded message");
        }
    }
}

/// Reporter used during testing to capture everything reported.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    statuses: Mutex<Vec<NodeStatus>>,
    logs: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    forwarded: Mutex<Vec<Message>>,
}

impl CollectingReporter {
    /// Creates a new collecting reporter.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns every status reported so far.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.statuses.lock().expect("collecting reporter poisoned").clone()
    }

    /// Returns the text of every status reported so far.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn status_texts(&self) -> Vec<String> {
        self.statuses()
            .iter()
            .map(|status| status.text().to_owned())
            .collect()
    }

    /// Returns every log line written so far.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().expect("collecting reporter poisoned").clone()
    }

    /// Returns every error reported so far.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("collecting reporter poisoned").clone()
    }

    /// Removes and returns the forwarded messages.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain_forwarded(&self) -> Vec<Message> {
        let mut lock = self.forwarded.lock().expect("collecting reporter poisoned");
        lock.drain(..).collect()
    }
}

impl StatusReporter for CollectingReporter {
    fn report_status(&self, status: NodeStatus) {
        self.statuses
            .lock()
            .expect("collecting reporter poisoned")
            .push(status);
    }

    fn log(&self, line: &str) {
        self.logs
            .lock()
            .expect("collecting reporter poisoned")
            .push(line.to_owned());
    }

    fn report_error(&self, error: &str) {
        self.errors
            .lock()
            .expect("collecting reporter poisoned")
            .push(error.to_owned());
    }

    fn forward(&self, message: Message) {
        self.forwarded
            .lock()
            .expect("collecting reporter poisoned")
            .push(message);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::StatusFill;

    #[test]
    fn collecting_reporter_records_everything() {
        let reporter = CollectingReporter::new();
        reporter.report_status(NodeStatus::retrying("PostData: retrying 2 of 3"));
        reporter.log("line");
        reporter.report_error("boom");
        reporter.forward(Message::new(json!([])));

        assert_eq!(reporter.statuses()[0].fill(), StatusFill::Yellow);
        assert_eq!(reporter.status_texts(), vec!["PostData: retrying 2 of 3"]);
        assert_eq!(reporter.logs(), vec!["line"]);
        assert_eq!(reporter.errors(), vec!["boom"]);
        assert_eq!(reporter.drain_forwarded().len(), 1);
        assert!(reporter.drain_forwarded().is_empty());
    }

    #[tokio::test]
    async fn channel_reporter_forwards_to_receiver() {
        let (reporter, mut receiver) = ChannelReporter::new();
        reporter.forward(Message::new(json!({"a": 1})));
        let message = receiver.recv().await.expect("forwarded message");
        assert_eq!(message.payload(), &json!({"a": 1}));

        drop(receiver);
        reporter.forward(Message::new(json!(null)));
    }
}
