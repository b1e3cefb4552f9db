use crate::commands::combine::print_report;
use crate::commands::{exit_if_fatal, CatalogArgs, DetectionArgs};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use batch_service::config::{default_workers, DEFAULT_TOOL};
use batch_service::execution::events::progress_channel;
use batch_service::{
    combine_outputs, Classification, DispatchOutcome, Dispatcher, DispatcherConfig, ExecutionEvent,
    JobExpander, LogLevel, ProcessRunner, RunConfig, RunSummary,
};

/// Exit status after an interruption (128 + SIGINT)
const EXIT_INTERRUPTED: i32 = 130;

/// Settled-job interval between progress lines for successful jobs
const PROGRESS_EVERY: usize = 100;

/// Run descriptor extraction over a dataset
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory scanned recursively for images
    #[arg(long, value_name = "DIR", default_value = "dataset")]
    pub dataset: PathBuf,

    /// Directory receiving per-job and combined outputs
    #[arg(long, short = 'o', value_name = "DIR", default_value = "results")]
    pub output: PathBuf,

    /// Extraction tool (path, or name looked up on PATH)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_TOOL)]
    pub tool: PathBuf,

    /// Number of parallel workers (default: available CPUs)
    #[arg(long, short = 'j', value_name = "N")]
    pub workers: Option<usize>,

    /// Per-job timeout in seconds; expired jobs count as hard failures
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip writing the combined result files
    #[arg(long)]
    pub no_combine: bool,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

impl RunArgs {
    fn to_config(&self) -> Result<RunConfig> {
        let mut config = RunConfig::new(&self.dataset, &self.output);
        config.tool = self.tool.clone();
        config.workers = self.workers.unwrap_or_else(default_workers);
        config.descriptor_ids = self.catalog.descriptors.clone();
        config.catalog_path = self.catalog.catalog.clone();
        config.timeout = self.timeout.map(Duration::from_secs);
        config.rule = self.detection.rule()?;
        config.combine = !self.no_combine;
        Ok(config)
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = args.to_config()?;

    // Nothing is created on disk until the configuration checks out
    output::status("Preparing", &format!("{}", config.dataset_dir.display()));
    let prepared = config.prepare().map_err(exit_if_fatal)?;

    let ids: Vec<String> = prepared.catalog.descriptors.iter().map(|d| d.id.to_string()).collect();
    output::info(&format!("Descriptors: [{}]", ids.join(", ")));
    output::info(&format!("Found {} image files to process", prepared.images.len()));

    tokio::fs::create_dir_all(&config.output_dir).await?;

    let jobs = JobExpander::expand(&prepared.catalog, &prepared.images, &config.output_dir);
    output::info(&format!(
        "Total job combinations: {} (images x descriptors x parameter combinations)",
        jobs.len()
    ));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let (tx, mut rx) = progress_channel();
    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            workers: config.workers,
            tool: prepared.tool.clone(),
            timeout: config.timeout,
        },
        Arc::new(ProcessRunner::new()),
        config.rule.clone(),
    )
    .with_progress(tx);

    // Spawn dispatch in background
    let dispatch_handle = tokio::spawn(async move { dispatcher.run(jobs, cancel).await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        render_event(&event);
    }

    let (tally, errors) = match dispatch_handle.await?? {
        DispatchOutcome::Completed { tally, errors } => (tally, errors),
        DispatchOutcome::Interrupted { errors, .. } => {
            output::warning(&format!("Interrupted with {}", errors));
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    match errors.persist(&config.output_dir).await {
        Ok(paths) => {
            for path in paths {
                output::dim(&format!("  Wrote {}", path.display()));
            }
        }
        Err(e) => output::error(&e.to_string()),
    }

    if config.combine {
        output::status("Combining", &format!("{}", config.output_dir.display()));
        match combine_outputs(prepared.catalog.clone(), config.output_dir.clone()).await {
            Ok(report) => print_report(&report),
            Err(e) => output::error(&format!("Failed to combine results: {}", e)),
        }
    }

    print!("{}", RunSummary::new(tally, errors.snapshot()));
    println!("\nIndividual results saved to {}/", config.output_dir.display());

    Ok(())
}

fn render_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { total_jobs, workers } => {
            println!();
            output::header(&format!("Processing {} jobs with {} workers", total_jobs, workers));
        }

        ExecutionEvent::JobCompleted {
            label,
            classification,
            settled,
            total,
            ..
        } => {
            let prefix = output::progress(*settled, *total);
            if *classification == Classification::AnomalousNumeric {
                output::warning(&format!("{} Numeric output from {}", prefix, label));
            } else if settled % PROGRESS_EVERY == 0 || settled == total {
                output::dim(&format!("  {} processed", prefix));
            }
        }

        ExecutionEvent::HardFailure {
            label,
            exit_code,
            stderr,
            timed_out,
            settled,
            total,
            ..
        } => {
            let reason = if *timed_out {
                "timed out".to_string()
            } else {
                match exit_code {
                    Some(code) => format!("exit code {}", code),
                    None => "could not run".to_string(),
                }
            };
            output::failure(&format!(
                "{} Failed to process {} ({})",
                output::progress(*settled, *total),
                label,
                reason
            ));
            for line in stderr.lines().filter(|l| !l.trim().is_empty()).take(3) {
                output::dim(&format!("        | {}", line));
            }
        }

        ExecutionEvent::PersistenceFailed { path, message } => {
            output::error(&format!("Could not write {}: {}", path.display(), message));
        }

        ExecutionEvent::AnomalySnapshot { snapshot } => {
            output::info(&snapshot.to_string());
        }

        ExecutionEvent::RunInterrupted { submitted, total } => {
            println!();
            output::warning(&format!(
                "Processing interrupted by user ({} of {} jobs submitted)",
                submitted, total
            ));
        }

        ExecutionEvent::RunCompleted {
            total,
            completed,
            failed,
            duration,
            ..
        } => {
            println!();
            let message = format!(
                "{} of {} jobs completed in {:.2}s",
                completed,
                total,
                duration.as_secs_f64()
            );
            if *failed == 0 {
                output::success(&message);
            } else {
                output::failure(&format!("{}, {} failed", message, failed));
            }
        }

        ExecutionEvent::Log { level, message } => match level {
            LogLevel::Error => output::error(message),
            LogLevel::Warning => output::warning(message),
        },
    }
}
