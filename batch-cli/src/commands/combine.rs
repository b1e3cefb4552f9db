use crate::commands::CatalogArgs;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use batch_service::combine_outputs;

/// Rebuild combined result files from existing outputs
#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Directory holding the per-job output files
    #[arg(long, short = 'o', value_name = "DIR", default_value = "results")]
    pub output: PathBuf,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

pub async fn execute(args: CombineArgs) -> Result<()> {
    if !args.output.is_dir() {
        color_eyre::eyre::bail!("Output directory not found: {}", args.output.display());
    }
    let catalog = args.catalog.load()?;

    output::status("Combining", &format!("{}", args.output.display()));
    let report = combine_outputs(catalog, args.output.clone()).await?;
    print_report(&report);

    Ok(())
}

pub fn print_report(report: &batch_service::CombineReport) {
    output::success(&format!(
        "Combined {} file(s) into {}",
        report.files,
        report.global_path.display()
    ));
    for (key, count) in &report.per_descriptor {
        output::dim(&format!("    {:<28} {}", key, count));
    }
    if report.unparsed > 0 {
        output::warning(&format!(
            "{} file(s) had no readable metadata header and were only added to the global file",
            report.unparsed
        ));
    }
    if report.unreadable > 0 {
        output::warning(&format!("{} file(s) could not be read", report.unreadable));
    }
}
