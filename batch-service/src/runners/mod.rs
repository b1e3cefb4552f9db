// Runners Module
// Command-execution abstraction over the external extraction tool

pub mod process;

// Re-export key types
pub use process::ProcessRunner;

use std::path::Path;
use std::time::Duration;

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, verbatim
    pub stdout: String,
    /// Standard error, verbatim (spawn and timeout diagnostics are appended here)
    pub stderr: String,
    /// Exit code; None when the process could not be spawned, was killed by a
    /// signal, or timed out
    pub exit_code: Option<i32>,
    /// Whether the command was killed after exceeding its timeout
    pub timed_out: bool,
}

impl CommandOutput {
    /// Output describing a process that never started
    pub fn spawn_failure(program: &Path, error: impl std::fmt::Display) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Failed to spawn '{}': {}", program.display(), error),
            exit_code: None,
            timed_out: false,
        }
    }
}

/// Trait for executing the extraction tool
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, never failing past this boundary
    async fn run(&self, program: &Path, args: &[String], timeout: Option<Duration>)
        -> CommandOutput;
}
