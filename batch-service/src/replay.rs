// Replay Analysis
// Recomputes the error log from persisted per-job files without running the tool

use crate::catalog::Catalog;
use crate::error::{ServiceError, ServiceResult};
use crate::execution::aggregator::{AggregateState, ErrorRecord};
use crate::output::combine::per_job_files;
use crate::output::{Classification, DetectionRule, JobMetadata};

use std::path::{Path, PathBuf};

/// Result of re-analysing an output directory
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// Per-job files found
    pub files: usize,
    /// Files without the numeric-output signature. Stored files carry no exit
    /// status, so this includes outputs of runs that actually failed.
    pub non_anomalous: usize,
    /// Files whose header could not be parsed
    pub unparsed: usize,
    /// Files that could not be read
    pub unreadable: usize,
    /// Files for descriptors outside the active set
    pub inactive: usize,
    /// Recomputed anomaly counters and error log
    pub errors: AggregateState,
    /// Error log and summary files written
    pub written: Vec<PathBuf>,
}

impl ReplayReport {
    pub fn anomalies(&self) -> usize {
        self.errors.total_errors()
    }
}

/// Re-classify every per-job file in `output_dir` and persist the error log.
///
/// Stored content carries no exit status, so each file is classified as a
/// zero-exit run; only the anomaly signature can be recovered.
pub async fn analyze(
    output_dir: &Path,
    catalog: &Catalog,
    rule: &DetectionRule,
) -> ServiceResult<ReplayReport> {
    if !output_dir.is_dir() {
        return Err(ServiceError::configuration(format!(
            "Output directory '{}' does not exist",
            output_dir.display()
        )));
    }

    let files = per_job_files(output_dir)?;
    let mut report = ReplayReport {
        files: files.len(),
        ..Default::default()
    };

    for path in &files {
        let content = match tokio::fs::read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(file = %path.display(), "skipping unreadable result file: {}", e);
                report.unreadable += 1;
                continue;
            }
        };

        let (metadata, output) = match JobMetadata::split_content(&content) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(file = %path.display(), "could not parse metadata header: {}", e);
                report.unparsed += 1;
                continue;
            }
        };

        if catalog.get(metadata.descriptor_id).is_none() {
            report.inactive += 1;
            continue;
        }

        match rule.classify(Some(0), output) {
            Classification::AnomalousNumeric => {
                if let Some(snapshot) = report.errors.apply(ErrorRecord::from_metadata(metadata, output)) {
                    tracing::info!("{}", snapshot);
                }
            }
            _ => report.non_anomalous += 1,
        }
    }

    report.written = report.errors.persist(output_dir).await?;

    tracing::info!(
        files = report.files,
        anomalies = report.anomalies(),
        unparsed = report.unparsed,
        "analysis finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::execution::aggregator::{ERROR_LOG_FILE, ERROR_SUMMARY_FILE};
    use crate::execution::ErrorSnapshot;

    use std::fs;

    fn write_job_file(dir: &Path, name: &str, image: &str, id: u32, descriptor: &str, output: &str) {
        let header = format!(
            r#"{{"image":"{}","descriptor_id":{},"descriptor_name":"{}","parameters":{{}}}}"#,
            image, id, descriptor
        );
        fs::write(dir.join(name), format!("{}\n{}", header, output)).unwrap();
    }

    #[tokio::test]
    async fn test_failed_run_output_is_not_anomalous() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        // Written for a non-zero exit; nothing on disk records that
        write_job_file(dir, "c_EDGE_HISTOGRAM_default.txt", "c.png", 8, "EDGE_HISTOGRAM", "");

        let report = analyze(dir, &Catalog::builtin(), &DetectionRule::default()).await.unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.non_anomalous, 1);
        assert_eq!(report.anomalies(), 0);
    }

    #[tokio::test]
    async fn test_analyze_recomputes_errors() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();

        write_job_file(dir, "a_EDGE_HISTOGRAM_default.txt", "a.png", 8, "EDGE_HISTOGRAM", "Descriptor XML:\n<Mpeg7/>\n");
        write_job_file(dir, "b_EDGE_HISTOGRAM_default.txt", "b.png", 8, "EDGE_HISTOGRAM", "Descriptor XML:\n42\n");
        write_job_file(dir, "b_REGION_SHAPE_default.txt", "b.png", 9, "REGION_SHAPE", "7");
        fs::write(dir.join("garbage.txt"), "not a header\n42\n").unwrap();
        // Combined artifacts and non-txt files are ignored
        fs::write(dir.join("combined_results.txt"), "# Combined\n").unwrap();
        fs::write(dir.join("notes.json"), "{}").unwrap();

        let report = analyze(dir, &Catalog::builtin(), &DetectionRule::default()).await.unwrap();

        assert_eq!(report.files, 4);
        assert_eq!(report.non_anomalous, 1);
        assert_eq!(report.anomalies(), 2);
        assert_eq!(report.unparsed, 1);
        assert!(report.errors.is_consistent());
        assert_eq!(report.written.len(), 2);

        let records: Vec<ErrorRecord> =
            serde_json::from_str(&fs::read_to_string(dir.join(ERROR_LOG_FILE)).unwrap()).unwrap();
        assert_eq!(records[0].image, "b.png");
        assert_eq!(records[0].descriptor_id, 8);
        assert_eq!(records[1].raw_output, "7");

        let summary: ErrorSnapshot =
            serde_json::from_str(&fs::read_to_string(dir.join(ERROR_SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary.by_descriptor["8 (EDGE_HISTOGRAM)"], 1);
        assert_eq!(summary.by_descriptor["9 (REGION_SHAPE)"], 1);
    }

    #[tokio::test]
    async fn test_analyze_respects_active_descriptors() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();

        write_job_file(dir, "a_EDGE_HISTOGRAM_default.txt", "a.png", 8, "EDGE_HISTOGRAM", "42");
        write_job_file(dir, "a_REGION_SHAPE_default.txt", "a.png", 9, "REGION_SHAPE", "42");

        let catalog = Catalog::builtin().select(&[9]).unwrap();
        let report = analyze(dir, &catalog, &DetectionRule::default()).await.unwrap();

        assert_eq!(report.inactive, 1);
        assert_eq!(report.anomalies(), 1);
        assert!(report.errors.by_descriptor().contains_key("9 (REGION_SHAPE)"));
    }

    #[tokio::test]
    async fn test_analyze_without_anomalies_writes_summary_only() {
        let temp = tempfile::tempdir().unwrap();
        write_job_file(temp.path(), "a_CT_BROWSING_default.txt", "a.png", 5, "CT_BROWSING", "<Mpeg7/>");

        let report = analyze(temp.path(), &Catalog::builtin(), &DetectionRule::default()).await.unwrap();

        assert_eq!(report.anomalies(), 0);
        assert!(!temp.path().join(ERROR_LOG_FILE).exists());
        assert!(temp.path().join(ERROR_SUMMARY_FILE).exists());
    }

    #[tokio::test]
    async fn test_analyze_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let err = analyze(&temp.path().join("missing"), &Catalog::builtin(), &DetectionRule::default())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
