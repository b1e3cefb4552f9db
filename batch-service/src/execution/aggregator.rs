// Error Aggregator
// Single-owner accumulation of anomalous-output counters and the error log

use crate::catalog::models::descriptor_key;
use crate::catalog::ParameterAssignment;
use crate::error::{ServiceError, ServiceResult};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::worker::JobResult;
use crate::output::JobMetadata;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Error log file, written only when anomalies occurred
pub const ERROR_LOG_FILE: &str = "numeric_output_errors.json";

/// Per-descriptor anomaly summary file
pub const ERROR_SUMMARY_FILE: &str = "error_summary.json";

/// Full context of one anomalous-numeric job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub image: String,
    pub descriptor_id: u32,
    pub descriptor_name: String,
    pub parameters: ParameterAssignment,
    pub raw_output: String,
}

impl ErrorRecord {
    pub fn from_result(result: &JobResult) -> Self {
        Self::from_metadata(JobMetadata::for_job(&result.job), &result.stdout)
    }

    /// Record rebuilt from a persisted output file
    pub fn from_metadata(metadata: JobMetadata, raw_output: &str) -> Self {
        Self {
            image: metadata.image,
            descriptor_id: metadata.descriptor_id,
            descriptor_name: metadata.descriptor_name,
            parameters: metadata.parameters,
            raw_output: raw_output.to_string(),
        }
    }

    pub fn descriptor_key(&self) -> String {
        descriptor_key(self.descriptor_id, &self.descriptor_name)
    }
}

/// Point-in-time view of the anomaly counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    pub total_errors: usize,
    /// Keyed by `"id (name)"`
    pub by_descriptor: BTreeMap<String, usize>,
}

impl fmt::Display for ErrorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} numeric output error(s)", self.total_errors)?;
        if !self.by_descriptor.is_empty() {
            let parts: Vec<String> = self
                .by_descriptor
                .iter()
                .map(|(key, count)| format!("{}: {}", key, count))
                .collect();
            write!(f, " [{}]", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Anomaly counters plus the ordered error log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    total_errors: usize,
    by_descriptor: BTreeMap<String, usize>,
    records: Vec<ErrorRecord>,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one anomaly as a single transaction: total counter, descriptor
    /// counter and log append.
    ///
    /// Returns a snapshot when the new total is 1 modulo 10 or when this is the
    /// descriptor's first anomaly.
    pub fn apply(&mut self, record: ErrorRecord) -> Option<ErrorSnapshot> {
        self.total_errors += 1;
        let count = self.by_descriptor.entry(record.descriptor_key()).or_insert(0);
        *count += 1;
        let first_for_descriptor = *count == 1;
        self.records.push(record);

        if self.total_errors % 10 == 1 || first_for_descriptor {
            Some(self.snapshot())
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot {
            total_errors: self.total_errors,
            by_descriptor: self.by_descriptor.clone(),
        }
    }

    pub fn total_errors(&self) -> usize {
        self.total_errors
    }

    pub fn by_descriptor(&self) -> &BTreeMap<String, usize> {
        &self.by_descriptor
    }

    /// Error log in the order anomalies were recorded
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Sum of per-descriptor counters equals the total, and every anomaly has a record
    pub fn is_consistent(&self) -> bool {
        self.by_descriptor.values().sum::<usize>() == self.total_errors
            && self.records.len() == self.total_errors
    }

    /// Write the error summary, plus the error log when anomalies occurred.
    ///
    /// Returns the paths written.
    pub async fn persist(&self, output_dir: &Path) -> ServiceResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(2);

        if !self.records.is_empty() {
            let path = output_dir.join(ERROR_LOG_FILE);
            let json = serde_json::to_string_pretty(&self.records)?;
            tokio::fs::write(&path, json)
                .await
                .map_err(|e| ServiceError::persistence(&path, e))?;
            written.push(path);
        }

        let path = output_dir.join(ERROR_SUMMARY_FILE);
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| ServiceError::persistence(&path, e))?;
        written.push(path);

        tracing::info!(
            total_errors = self.total_errors,
            dir = %output_dir.display(),
            "persisted error summary"
        );
        Ok(written)
    }
}

enum Message {
    Record(ErrorRecord),
    Snapshot(oneshot::Sender<ErrorSnapshot>),
}

/// Cloneable handle feeding the aggregation task.
///
/// The task is the only owner of the `AggregateState`, so each anomaly is
/// applied whole before the next message is read.
#[derive(Debug, Clone)]
pub struct Aggregator {
    tx: mpsc::UnboundedSender<Message>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Message::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

/// Owner side of the aggregation task
pub struct AggregatorTask {
    handle: JoinHandle<AggregateState>,
}

impl Aggregator {
    /// Spawn the aggregation task. Snapshots go to `events` and the log.
    pub fn spawn(events: Option<ProgressSender>) -> (Aggregator, AggregatorTask) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let handle = tokio::spawn(async move {
            let mut state = AggregateState::new();
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Record(record) => {
                        if let Some(snapshot) = state.apply(record) {
                            tracing::info!("{}", snapshot);
                            events.send_event(ExecutionEvent::anomaly_snapshot(snapshot));
                        }
                    }
                    Message::Snapshot(reply) => {
                        let _ = reply.send(state.snapshot());
                    }
                }
            }
            state
        });

        (Aggregator { tx }, AggregatorTask { handle })
    }

    /// Record a job outcome; only anomalous results change the state.
    ///
    /// Returns whether the result was an anomaly.
    pub fn record_outcome(&self, result: &JobResult) -> bool {
        if !result.is_anomalous() {
            return false;
        }
        self.record(ErrorRecord::from_result(result));
        true
    }

    pub fn record(&self, record: ErrorRecord) {
        if self.tx.send(Message::Record(record)).is_err() {
            tracing::error!("aggregator task is gone, anomaly dropped");
        }
    }

    /// Current counters; None once the task has stopped
    pub async fn snapshot(&self) -> Option<ErrorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Message::Snapshot(reply)).ok()?;
        rx.await.ok()
    }
}

impl AggregatorTask {
    /// Wait for every handle to drop and return the final state
    pub async fn finish(self) -> ServiceResult<AggregateState> {
        self.handle
            .await
            .map_err(|e| ServiceError::Task(format!("aggregator: {}", e)))
    }
}
