// Execution Module
// Job expansion, worker invocation, aggregation and the dispatcher

pub mod aggregator;
pub mod dispatcher;
pub mod events;
pub mod jobs;
pub mod worker;

// Re-export key types
pub use aggregator::{AggregateState, Aggregator, AggregatorTask, ErrorRecord, ErrorSnapshot};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherConfig, RunTally};
pub use events::{progress_channel, EventSender, ExecutionEvent, LogLevel, ProgressReceiver, ProgressSender};
pub use jobs::{JobExpander, JobSpec};
pub use worker::JobResult;
