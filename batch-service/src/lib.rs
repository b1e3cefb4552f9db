// Batch Service Library
// Job expansion, bounded-parallel extraction runs and result aggregation

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod output;
pub mod replay;
pub mod report;
pub mod runners;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export catalog types
pub use catalog::{
    Catalog, CatalogError, DescriptorSpec, ParameterAssignment, ParameterDomain, ParameterGroup,
};

// Re-export configuration types
pub use config::{PreparedRun, RunConfig};

// Re-export execution types
pub use execution::{
    progress_channel, AggregateState, Aggregator, DispatchOutcome, Dispatcher, DispatcherConfig,
    ErrorRecord, ErrorSnapshot, EventSender, ExecutionEvent, JobExpander, JobResult, JobSpec,
    LogLevel, ProgressReceiver, ProgressSender, RunTally,
};

// Re-export output types
pub use output::{
    combine_outputs, write_result, Classification, CombineReport, Combiner, DetectionRule, JobMetadata,
};

// Re-export runner types
pub use runners::{CommandOutput, CommandRunner, ProcessRunner};

pub use replay::{analyze, ReplayReport};
pub use report::RunSummary;
