// Worker Invocation
// Runs one job against the extraction tool and classifies the result

use crate::execution::jobs::JobSpec;
use crate::output::{Classification, DetectionRule};
use crate::runners::CommandRunner;

use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of one job invocation
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job: JobSpec,
    /// None when the tool could not be spawned, was killed, or timed out
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub classification: Classification,
    pub timed_out: bool,
    pub duration: Duration,
}

impl JobResult {
    pub fn is_anomalous(&self) -> bool {
        self.classification == Classification::AnomalousNumeric
    }

    pub fn is_hard_failure(&self) -> bool {
        self.classification == Classification::HardFailure
    }
}

/// Run `job` through `runner` and classify its output.
///
/// Never fails: spawn errors, non-zero exits and timeouts all come back as
/// a `HardFailure` result carrying the diagnostics.
pub async fn invoke(
    job: JobSpec,
    tool: &Path,
    runner: &dyn CommandRunner,
    rule: &DetectionRule,
    timeout: Option<Duration>,
) -> JobResult {
    let start = Instant::now();
    let args = job.command_args();

    tracing::debug!(job = job.index, tool = %tool.display(), ?args, "invoking tool");
    let output = runner.run(tool, &args, timeout).await;

    let classification = rule.classify(output.exit_code, &output.stdout);
    let duration = start.elapsed();

    if classification == Classification::HardFailure {
        tracing::debug!(
            job = job.index,
            exit_code = ?output.exit_code,
            timed_out = output.timed_out,
            "job failed"
        );
    }

    JobResult {
        job,
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        classification,
        timed_out: output.timed_out,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::ParameterAssignment;
    use crate::runners::CommandOutput;

    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Returns a fixed output and remembers the argv it saw
    struct FixedRunner {
        output: CommandOutput,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CommandRunner for FixedRunner {
        async fn run(
            &self,
            _program: &Path,
            args: &[String],
            _timeout: Option<Duration>,
        ) -> CommandOutput {
            *self.seen.lock().unwrap() = args.to_vec();
            self.output.clone()
        }
    }

    fn runner(exit_code: Option<i32>, stdout: &str) -> FixedRunner {
        FixedRunner {
            output: CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
                timed_out: false,
            },
            seen: Mutex::new(Vec::new()),
        }
    }

    fn job() -> JobSpec {
        let parameters: ParameterAssignment =
            [("NumberOfYCoeff", "6"), ("NumberOfCCoeff", "3")].into_iter().collect();
        JobSpec {
            index: 0,
            image: PathBuf::from("/data/cat.png"),
            descriptor_id: 3,
            descriptor_name: "COLOR_LAYOUT".to_string(),
            parameters,
            output_path: PathBuf::from("/out/cat_COLOR_LAYOUT_NumberOfYCoeff-6_NumberOfCCoeff-3.txt"),
        }
    }

    #[tokio::test]
    async fn test_invoke_passes_flattened_args() {
        let runner = runner(Some(0), "Descriptor XML:\n<Mpeg7/>\n");
        let result = invoke(job(), Path::new("tool"), &runner, &DetectionRule::default(), None).await;

        assert_eq!(result.classification, Classification::Success);
        assert_eq!(
            *runner.seen.lock().unwrap(),
            vec!["3", "/data/cat.png", "NumberOfYCoeff", "6", "NumberOfCCoeff", "3"]
        );
    }

    #[tokio::test]
    async fn test_invoke_numeric_output_is_anomalous() {
        let runner = runner(Some(0), "Descriptor XML:\n42\n");
        let result = invoke(job(), Path::new("tool"), &runner, &DetectionRule::default(), None).await;

        assert!(result.is_anomalous());
        assert_eq!(result.stdout, "Descriptor XML:\n42\n");
    }

    #[tokio::test]
    async fn test_invoke_nonzero_exit_is_hard_failure() {
        let runner = runner(Some(2), "<Mpeg7/>");
        let result = invoke(job(), Path::new("tool"), &runner, &DetectionRule::default(), None).await;

        assert!(result.is_hard_failure());
        assert_eq!(result.exit_code, Some(2));
    }

    #[tokio::test]
    async fn test_invoke_spawn_failure_is_hard_failure() {
        let runner = FixedRunner {
            output: CommandOutput::spawn_failure(Path::new("missing"), "not found"),
            seen: Mutex::new(Vec::new()),
        };
        let result =
            invoke(job(), Path::new("missing"), &runner, &DetectionRule::default(), None).await;

        assert!(result.is_hard_failure());
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("missing"));
    }
}
