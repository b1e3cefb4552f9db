// Execution Events
// Progress reporting and event types for batch runs

use crate::execution::aggregator::ErrorSnapshot;
use crate::output::Classification;

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a batch run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Dispatching started
    RunStarted { total_jobs: usize, workers: usize },

    /// A job settled with a completed (success or anomalous) classification
    JobCompleted {
        index: usize,
        label: String,
        classification: Classification,
        duration: Duration,
        /// Jobs settled so far, this one included
        settled: usize,
        total: usize,
    },

    /// The tool failed for a job (spawn error, non-zero exit or timeout)
    HardFailure {
        index: usize,
        label: String,
        exit_code: Option<i32>,
        stderr: String,
        timed_out: bool,
        settled: usize,
        total: usize,
    },

    /// A job's output file could not be written
    PersistenceFailed { path: PathBuf, message: String },

    /// Running anomaly totals after a snapshot-worthy anomaly
    AnomalySnapshot { snapshot: ErrorSnapshot },

    /// The run was interrupted; no more jobs are submitted
    RunInterrupted { submitted: usize, total: usize },

    /// All jobs settled
    RunCompleted {
        total: usize,
        /// Success plus anomalous, written
        completed: usize,
        /// Hard failures plus unwritten outputs
        failed: usize,
        anomalies: usize,
        duration: Duration,
    },

    /// Log message (warning, error)
    Log { level: LogLevel, message: String },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warning,
    Error,
}

impl ExecutionEvent {
    /// Create a run started event
    pub fn run_started(total_jobs: usize, workers: usize) -> Self {
        Self::RunStarted {
            total_jobs,
            workers,
        }
    }

    /// Create an interrupted event
    pub fn run_interrupted(submitted: usize, total: usize) -> Self {
        Self::RunInterrupted { submitted, total }
    }

    /// Create an anomaly snapshot event
    pub fn anomaly_snapshot(snapshot: ErrorSnapshot) -> Self {
        Self::AnomalySnapshot { snapshot }
    }

    /// Create a persistence failure event
    pub fn persistence_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PersistenceFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a log event
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warning, message)
    }

    /// Create an error log event
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }
}

/// Trait for sending events (allows for optional sender)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::run_started(4, 2));
        tx.send_event(ExecutionEvent::warning("tool not found"));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            ExecutionEvent::RunStarted {
                total_jobs: 4,
                workers: 2
            }
        ));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            ExecutionEvent::Log {
                level: LogLevel::Warning,
                ..
            }
        ));
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::error("test"));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(ExecutionEvent::run_interrupted(1, 2));
    }
}
