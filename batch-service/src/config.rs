// Run Configuration
// Validated settings for a batch run, checked before any job is generated

use crate::catalog::Catalog;
use crate::discovery::discover_images;
use crate::error::{ServiceError, ServiceResult};
use crate::output::classify::DetectionRule;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default name of the extraction tool when none is given
pub const DEFAULT_TOOL: &str = "mpeg7_app";

/// Configuration for a live extraction run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory scanned for input images
    pub dataset_dir: PathBuf,
    /// Directory receiving per-job and combined outputs
    pub output_dir: PathBuf,
    /// Extraction tool (path or bare name looked up on PATH)
    pub tool: PathBuf,
    /// Size of the worker pool
    pub workers: usize,
    /// Descriptor ids to run (empty = whole catalog)
    pub descriptor_ids: Vec<u32>,
    /// Optional YAML catalog replacing the built-in one
    pub catalog_path: Option<PathBuf>,
    /// Per-job timeout (None = wait indefinitely)
    pub timeout: Option<Duration>,
    /// Anomaly detection rule
    pub rule: DetectionRule,
    /// Run the combiner after the parallel phase
    pub combine: bool,
}

/// Everything a run needs once configuration has been checked
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Active descriptors, in catalog order
    pub catalog: Catalog,
    /// Discovered images, sorted
    pub images: Vec<PathBuf>,
    /// Resolved extraction tool
    pub tool: PathBuf,
}

impl RunConfig {
    pub fn new(dataset_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            output_dir: output_dir.into(),
            tool: PathBuf::from(DEFAULT_TOOL),
            workers: default_workers(),
            descriptor_ids: Vec::new(),
            catalog_path: None,
            timeout: None,
            rule: DetectionRule::default(),
            combine: true,
        }
    }

    /// Load the configured catalog (or the built-in one) and apply the selector
    pub fn load_catalog(&self) -> ServiceResult<Catalog> {
        load_catalog(self.catalog_path.as_deref(), &self.descriptor_ids)
    }

    /// Check the configuration without touching the output directory
    pub fn prepare(&self) -> ServiceResult<PreparedRun> {
        if self.workers == 0 {
            return Err(ServiceError::configuration(
                "Worker count must be at least 1",
            ));
        }

        let catalog = self.load_catalog()?;
        let images = discover_images(&self.dataset_dir)?;
        let tool = resolve_tool(&self.tool);

        Ok(PreparedRun {
            catalog,
            images,
            tool,
        })
    }
}

/// Load a YAML catalog (or the built-in one) and select `descriptor_ids` from it
pub fn load_catalog(catalog_path: Option<&Path>, descriptor_ids: &[u32]) -> ServiceResult<Catalog> {
    let catalog = match catalog_path {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::builtin(),
    };
    Ok(catalog.select(descriptor_ids)?)
}

/// Number of workers used when none is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Resolve a bare tool name through PATH.
///
/// An unresolvable tool is not a configuration error: every job then records
/// a hard failure with the spawn error, and the run continues.
pub fn resolve_tool(tool: &Path) -> PathBuf {
    if tool.components().count() > 1 || tool.is_absolute() {
        return tool.to_path_buf();
    }
    match which::which(tool) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(tool = %tool.display(), "extraction tool not found on PATH: {}", e);
            tool.to_path_buf()
        }
    }
}
