// Service Errors
// Run-level failures; per-job failures are carried as classifications instead

use crate::catalog::CatalogError;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that stop or degrade a batch run
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad paths or selectors; fatal before any job runs
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A result, combined or summary file could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task (aggregator) ended abnormally
    #[error("Task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ServiceError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::Configuration(_) | ServiceError::Catalog(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_is_fatal() {
        let err = ServiceError::configuration("dataset directory missing");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Configuration error: dataset directory missing"
        );
    }

    #[test]
    fn test_persistence_is_not_fatal() {
        let err = ServiceError::persistence(
            "/out/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("Failed to write /out/a.txt"));
    }
}
