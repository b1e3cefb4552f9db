// MPEG-7 Batch CLI
// Runs descriptor extraction over an image dataset and aggregates the results

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::analyze::AnalyzeArgs;
use commands::combine::CombineArgs;
use commands::list::ListArgs;
use commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(
    name = "mpeg7-batch",
    version,
    about = "Batch MPEG-7 descriptor extraction",
    after_help = "EXAMPLES:\n  \
                  # Run every descriptor over a dataset with 8 workers\n  \
                  mpeg7-batch run --dataset ./images --output ./results --workers 8\n\n  \
                  # Run only COLOR_LAYOUT and EDGE_HISTOGRAM\n  \
                  mpeg7-batch run --dataset ./images --descriptor 3 --descriptor 8\n\n  \
                  # Recompute the error log from existing outputs\n  \
                  mpeg7-batch analyze --output ./results"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the extraction tool for every image, descriptor and parameter set
    Run(RunArgs),

    /// Re-classify existing output files without invoking the tool
    Analyze(AnalyzeArgs),

    /// Print the descriptor catalog and exit
    List(ListArgs),

    /// Rebuild the combined result files from existing outputs
    Combine(CombineArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Analyze(args) => commands::analyze::execute(args).await,
        Commands::List(args) => commands::list::execute(args),
        Commands::Combine(args) => commands::combine::execute(args).await,
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "batch_service=debug,mpeg7_batch=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
