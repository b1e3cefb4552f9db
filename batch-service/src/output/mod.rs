// Output Module
// Classification, per-job persistence and combined artifacts

pub mod classify;
pub mod combine;
pub mod writer;

// Re-export key types
pub use classify::{Classification, DetectionRule};
pub use combine::{combine_outputs, CombineReport, Combiner};
pub use writer::{output_path, write_result, JobMetadata};
