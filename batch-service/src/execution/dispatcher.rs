// Dispatcher
// Bounded worker pool feeding jobs to the tool and settling their results

use crate::config::{default_workers, DEFAULT_TOOL};
use crate::error::ServiceResult;
use crate::execution::aggregator::{AggregateState, Aggregator, ErrorSnapshot};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::jobs::JobSpec;
use crate::execution::worker::{self, JobResult};
use crate::output::{write_result, Classification, DetectionRule};
use crate::runners::CommandRunner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Configuration for a dispatch run
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Size of the worker pool
    pub workers: usize,
    /// Extraction tool
    pub tool: PathBuf,
    /// Per-job timeout; expiry is a hard failure
    pub timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            tool: PathBuf::from(DEFAULT_TOOL),
            timeout: None,
        }
    }
}

/// Final counts of a dispatch run.
///
/// Every settled job lands in exactly one bucket. A tool failure wins over a
/// write failure; a job whose output file could not be written is a failure
/// whatever its classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTally {
    /// Jobs handed to the dispatcher
    pub total: usize,
    pub succeeded: usize,
    /// Anomalous-numeric jobs whose output was written
    pub anomalies: usize,
    pub hard_failures: usize,
    /// Jobs the tool finished but whose output file could not be written
    pub persistence_failures: usize,
    pub duration: Duration,
}

impl RunTally {
    /// Success plus anomalous: jobs that finished without a crash and were written
    pub fn completed(&self) -> usize {
        self.succeeded + self.anomalies
    }

    /// Hard failures plus unwritten outputs
    pub fn failed(&self) -> usize {
        self.hard_failures + self.persistence_failures
    }

    /// Jobs with a recorded result
    pub fn recorded(&self) -> usize {
        self.completed() + self.failed()
    }

    fn record(&mut self, classification: Classification, written: bool) {
        match classification {
            Classification::HardFailure => self.hard_failures += 1,
            _ if !written => self.persistence_failures += 1,
            Classification::Success => self.succeeded += 1,
            Classification::AnomalousNumeric => self.anomalies += 1,
        }
    }
}

/// How a dispatch run ended
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Every job settled
    Completed {
        tally: RunTally,
        errors: AggregateState,
    },
    /// Cancellation was requested; in-flight jobs were aborted
    Interrupted {
        tally: RunTally,
        submitted: usize,
        /// Anomaly totals read while the aborted jobs were still in flight
        errors: ErrorSnapshot,
    },
}

impl DispatchOutcome {
    pub fn tally(&self) -> &RunTally {
        match self {
            DispatchOutcome::Completed { tally, .. } => tally,
            DispatchOutcome::Interrupted { tally, .. } => tally,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, DispatchOutcome::Interrupted { .. })
    }
}

/// What one pool task hands back
struct JobOutcome {
    result: JobResult,
    write_error: Option<String>,
}

/// Batch dispatcher
pub struct Dispatcher {
    config: DispatcherConfig,
    runner: Arc<dyn CommandRunner>,
    rule: Arc<DetectionRule>,
    /// Progress event sender
    event_tx: Option<ProgressSender>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, runner: Arc<dyn CommandRunner>, rule: DetectionRule) -> Self {
        Self {
            config,
            runner,
            rule: Arc::new(rule),
            event_tx: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run every job through the pool.
    ///
    /// Each job is invoked, classified, handed to the aggregator and written
    /// exactly once. Cancellation is checked before every submission; once
    /// seen, in-flight jobs are aborted and their children killed.
    pub async fn run(&self, jobs: Vec<JobSpec>, cancel: CancellationToken) -> ServiceResult<DispatchOutcome> {
        let start = Instant::now();
        let workers = self.config.workers.max(1);
        let mut tally = RunTally {
            total: jobs.len(),
            ..RunTally::default()
        };

        tracing::info!(jobs = tally.total, workers, tool = %self.config.tool.display(), "dispatch started");
        self.event_tx
            .send_event(ExecutionEvent::run_started(tally.total, workers));

        let (aggregator, aggregator_task) = Aggregator::spawn(self.event_tx.clone());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut pending = jobs.into_iter().peekable();
        let mut in_flight: JoinSet<JobOutcome> = JoinSet::new();
        let mut submitted = 0usize;
        let mut interrupted = false;

        loop {
            if pending.peek().is_none() && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.settle(joined, &mut tally);
                }

                permit = semaphore.clone().acquire_owned(), if pending.peek().is_some() => {
                    let Ok(permit) = permit else { break };
                    let Some(job) = pending.next() else { break };

                    let runner = Arc::clone(&self.runner);
                    let rule = Arc::clone(&self.rule);
                    let aggregator = aggregator.clone();
                    let tool = self.config.tool.clone();
                    let timeout = self.config.timeout;

                    in_flight.spawn(async move {
                        let _permit = permit;
                        let result = worker::invoke(job, &tool, runner.as_ref(), &rule, timeout).await;
                        aggregator.record_outcome(&result);
                        let write_error = write_result(&result).await.err().map(|e| e.to_string());
                        JobOutcome { result, write_error }
                    });
                    submitted += 1;
                }
            }
        }

        if interrupted {
            // Live read while aborted jobs may still be reporting
            let errors = aggregator.snapshot().await.unwrap_or_default();
            drop(aggregator);
            in_flight.shutdown().await;
            // Drain the aggregator so its task does not outlive the run
            aggregator_task.finish().await?;
            tally.duration = start.elapsed();

            tracing::warn!(submitted, settled = tally.recorded(), total = tally.total, "run interrupted");
            self.event_tx
                .send_event(ExecutionEvent::run_interrupted(submitted, tally.total));
            return Ok(DispatchOutcome::Interrupted {
                tally,
                submitted,
                errors,
            });
        }

        drop(aggregator);
        let errors = aggregator_task.finish().await?;
        tally.duration = start.elapsed();

        if tally.recorded() != tally.total {
            tracing::error!(recorded = tally.recorded(), total = tally.total, "job results missing");
            self.event_tx.send_event(ExecutionEvent::warning(format!(
                "{} of {} jobs have no recorded result",
                tally.total - tally.recorded().min(tally.total),
                tally.total
            )));
        }
        // The error log keeps anomalies whose output file could not be written
        let aggregated = errors.total_errors();
        if !errors.is_consistent()
            || aggregated < tally.anomalies
            || aggregated > tally.anomalies + tally.persistence_failures
        {
            tracing::error!(aggregated, anomalies = tally.anomalies, "anomaly counters disagree");
        }

        tracing::info!(
            total = tally.total,
            completed = tally.completed(),
            failed = tally.failed(),
            anomalies = tally.anomalies,
            "dispatch finished in {:.2?}",
            tally.duration
        );
        self.event_tx.send_event(ExecutionEvent::RunCompleted {
            total: tally.total,
            completed: tally.completed(),
            failed: tally.failed(),
            anomalies: tally.anomalies,
            duration: tally.duration,
        });

        Ok(DispatchOutcome::Completed { tally, errors })
    }

    fn settle(&self, joined: Result<JobOutcome, JoinError>, tally: &mut RunTally) {
        let JobOutcome { result, write_error } = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // A panicked job still owes the tally one result
                tracing::error!("job task failed: {}", e);
                tally.hard_failures += 1;
                self.event_tx
                    .send_event(ExecutionEvent::error(format!("Job task failed: {}", e)));
                return;
            }
        };

        tally.record(result.classification, write_error.is_none());
        let settled = tally.recorded();

        if let Some(message) = write_error {
            tracing::warn!(path = %result.job.output_path.display(), "{}", message);
            self.event_tx.send_event(ExecutionEvent::persistence_failed(
                &result.job.output_path,
                message,
            ));
        }

        let label = result.job.label();
        if result.is_hard_failure() {
            tracing::warn!(
                job = result.job.index,
                exit_code = ?result.exit_code,
                "failed to process {}: {}",
                label,
                result.stderr.trim()
            );
            self.event_tx.send_event(ExecutionEvent::HardFailure {
                index: result.job.index,
                label,
                exit_code: result.exit_code,
                stderr: result.stderr,
                timed_out: result.timed_out,
                settled,
                total: tally.total,
            });
        } else {
            tracing::debug!(job = result.job.index, classification = %result.classification, "job settled");
            self.event_tx.send_event(ExecutionEvent::JobCompleted {
                index: result.job.index,
                label,
                classification: result.classification,
                duration: result.duration,
                settled,
                total: tally.total,
            });
        }
    }
}
