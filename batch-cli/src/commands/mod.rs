// CLI Commands
// Subcommand implementations and argument groups they share

pub mod analyze;
pub mod combine;
pub mod list;
pub mod run;

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};

use batch_service::config::load_catalog;
use batch_service::output::classify::DEFAULT_HEADER_LINE;
use batch_service::{Catalog, DetectionRule, ServiceError};

use crate::output;

/// Exit with status 1 on an error that aborts the whole run; pass others on
pub fn exit_if_fatal(err: ServiceError) -> Report {
    if err.is_fatal() {
        output::error(&err.to_string());
        std::process::exit(1);
    }
    err.into()
}

/// Descriptor selection
#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    /// Descriptor id to process (repeatable; default: all)
    #[arg(long = "descriptor", short = 'd', value_name = "ID")]
    pub descriptors: Vec<u32>,

    /// YAML catalog replacing the built-in descriptor set
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn load(&self) -> Result<Catalog> {
        Ok(load_catalog(self.catalog.as_deref(), &self.descriptors)?)
    }
}

/// Anomaly detection framing
#[derive(Args, Debug, Clone)]
pub struct DetectionArgs {
    /// Header line stripped before the payload (repeatable)
    #[arg(long = "header-line", value_name = "TEXT", default_value = DEFAULT_HEADER_LINE)]
    pub header_lines: Vec<String>,

    /// Regex a lone payload line must match to count as a numeric error
    #[arg(long, value_name = "REGEX")]
    pub anomaly_pattern: Option<String>,
}

impl DetectionArgs {
    pub fn rule(&self) -> Result<DetectionRule> {
        let rule = DetectionRule::default().with_header_lines(self.header_lines.clone());
        match &self.anomaly_pattern {
            Some(pattern) => rule
                .with_numeric_pattern(pattern)
                .map_err(|e| eyre!("Invalid anomaly pattern '{}': {}", pattern, e)),
            None => Ok(rule),
        }
    }
}
