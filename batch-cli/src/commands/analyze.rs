use crate::commands::{exit_if_fatal, CatalogArgs, DetectionArgs};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use batch_service::analyze;

/// Re-classify existing outputs and rewrite the error log
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Directory holding the per-job output files
    #[arg(long, short = 'o', value_name = "DIR", default_value = "results")]
    pub output: PathBuf,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

pub async fn execute(args: AnalyzeArgs) -> Result<()> {
    let catalog = args.catalog.load()?;
    let rule = args.detection.rule()?;

    output::status("Analyzing", &format!("{}", args.output.display()));
    let report = analyze(&args.output, &catalog, &rule).await.map_err(exit_if_fatal)?;

    output::info(&format!(
        "{} file(s): {} without numeric output, {} numeric output error(s)",
        report.files,
        report.non_anomalous,
        report.anomalies()
    ));
    if report.unparsed > 0 {
        output::warning(&format!("{} file(s) skipped: unreadable metadata header", report.unparsed));
    }
    if report.unreadable > 0 {
        output::warning(&format!("{} file(s) could not be read", report.unreadable));
    }
    if report.inactive > 0 {
        output::dim(&format!("{} file(s) belong to unselected descriptors", report.inactive));
    }

    for (key, count) in report.errors.by_descriptor() {
        output::dim(&format!("    {:<28} {}", key, count));
    }
    for path in &report.written {
        output::success(&format!("Wrote {}", path.display()));
    }

    Ok(())
}
