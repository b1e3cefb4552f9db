// Process Runner
// Spawns the extraction tool and captures its output streams

use crate::runners::{CommandOutput, CommandRunner};

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long the stream readers may run on once the job's time is up.
/// Descendants of the tool can hold the pipes open after it is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runner backed by real OS processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> CommandOutput {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // An aborted job must not leave the tool running
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return CommandOutput::spawn_failure(program, e),
        };

        // Read both streams concurrently so a chatty stderr cannot block stdout
        let stdout_handle = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_handle = tokio::spawn(read_stream(child.stderr.take()));

        let limit = timeout.map(|timeout| (timeout, Instant::now() + timeout));

        let wait_result = match limit {
            Some((timeout, deadline)) => match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    let grace = Some(Instant::now() + DRAIN_GRACE);
                    let stdout = drain(stdout_handle, grace).await;
                    let mut stderr = drain(stderr_handle, grace).await;
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!("Process timed out after {:?}", timeout));
                    return CommandOutput {
                        stdout,
                        stderr,
                        exit_code: None,
                        timed_out: true,
                    };
                }
            },
            None => child.wait().await,
        };

        let (exit_code, wait_error) = match wait_result {
            Ok(status) => (status.code(), None),
            Err(e) => (None, Some(e)),
        };
        let grace = limit.map(|(_, deadline)| deadline.max(Instant::now()) + DRAIN_GRACE);
        let stdout = drain(stdout_handle, grace).await;
        let mut stderr = drain(stderr_handle, grace).await;

        if let Some(e) = wait_error {
            stderr.push_str(&format!("Failed to wait for '{}': {}", program.display(), e));
        }

        CommandOutput {
            stdout,
            stderr,
            exit_code,
            timed_out: false,
        }
    }
}

/// Join a reader task, aborting it once `deadline` passes
async fn drain(handle: JoinHandle<String>, deadline: Option<Instant>) -> String {
    let Some(deadline) = deadline else {
        return handle.await.unwrap_or_default();
    };
    let abort = handle.abort_handle();
    match tokio::time::timeout_at(deadline, handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            tracing::debug!("child stream still open after grace period");
            abort.abort();
            String::new()
        }
    }
}

/// Drain a child stream into a string (lossy UTF-8)
async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            tracing::debug!("error reading child stream: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_process_runner_captures_stdout() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(Path::new("sh"), &sh("printf 'Descriptor XML:\\n<a/>\\n'"), None)
            .await;

        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "Descriptor XML:\n<a/>\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_process_runner_passes_arguments() {
        let runner = ProcessRunner::new();
        let args = vec![
            "-c".to_string(),
            "echo \"$0 $1 $2\"".to_string(),
            "3".to_string(),
            "img.png".to_string(),
            "NumberOfYCoeff".to_string(),
        ];
        let output = runner.run(Path::new("sh"), &args, None).await;

        assert_eq!(output.stdout.trim(), "3 img.png NumberOfYCoeff");
    }

    #[tokio::test]
    async fn test_process_runner_exit_code() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(Path::new("sh"), &sh("echo boom >&2; exit 2"), None)
            .await;

        assert_eq!(output.exit_code, Some(2));
        assert!(output.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(Path::new("/nonexistent/mpeg7_app"), &[], None)
            .await;

        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("Failed to spawn"));
        assert!(output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_process_runner_timeout() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(
                Path::new("sh"),
                &sh("exec sleep 5"),
                Some(Duration::from_millis(100)),
            )
            .await;

        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_bounds_descendants_holding_pipes() {
        let runner = ProcessRunner::new();
        let start = std::time::Instant::now();
        // The shell forks sleep, which keeps stdout open after the shell is killed
        let output = runner
            .run(
                Path::new("sh"),
                &sh("sleep 3; echo done"),
                Some(Duration::from_millis(100)),
            )
            .await;

        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!output.stdout.contains("done"));
    }

    #[tokio::test]
    async fn test_output_within_timeout_is_kept() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(Path::new("sh"), &sh("echo '<a/>'"), Some(Duration::from_secs(5)))
            .await;

        assert!(!output.timed_out);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "<a/>\n");
    }
}
