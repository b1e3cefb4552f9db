// Result Writer
// Persists one output file per job with an embedded JSON metadata header

use crate::catalog::ParameterAssignment;
use crate::error::{ServiceError, ServiceResult};
use crate::execution::jobs::JobSpec;
use crate::execution::worker::JobResult;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Metadata written as the first line of every per-job output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Image file name, including extension
    pub image: String,
    pub descriptor_id: u32,
    pub descriptor_name: String,
    pub parameters: ParameterAssignment,
}

impl JobMetadata {
    pub fn for_job(job: &JobSpec) -> Self {
        Self {
            image: job.image_file_name(),
            descriptor_id: job.descriptor_id,
            descriptor_name: job.descriptor_name.clone(),
            parameters: job.parameters.clone(),
        }
    }

    /// Single-line JSON header
    pub fn to_header(&self) -> ServiceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse_header(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }

    /// Split file content into its parsed header and the captured output after it
    pub fn split_content(content: &str) -> Result<(Self, &str), serde_json::Error> {
        let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
        Ok((Self::parse_header(first)?, rest))
    }
}

/// `{stem}_{descriptor}_{k1-v1_k2-v2}.txt`, or `..._default.txt` without parameters
pub fn output_file_name(image: &Path, descriptor_name: &str, params: &ParameterAssignment) -> String {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("{}_{}_{}.txt", stem, descriptor_name, params.file_fragment())
}

/// Per-job output path inside `output_dir`
pub fn output_path(
    output_dir: &Path,
    image: &Path,
    descriptor_name: &str,
    params: &ParameterAssignment,
) -> PathBuf {
    output_dir.join(output_file_name(image, descriptor_name, params))
}

/// Write the job's output file: metadata line followed by the raw stdout.
///
/// Written for every classification, including hard failures.
pub async fn write_result(result: &JobResult) -> ServiceResult<PathBuf> {
    let path = result.job.output_path.clone();
    let header = JobMetadata::for_job(&result.job).to_header()?;

    let mut content = String::with_capacity(header.len() + 1 + result.stdout.len());
    content.push_str(&header);
    content.push('\n');
    content.push_str(&result.stdout);

    tokio::fs::write(&path, content)
        .await
        .map_err(|e| ServiceError::persistence(&path, e))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::output::classify::Classification;
    use std::time::Duration;

    fn job(output_dir: &Path, params: ParameterAssignment) -> JobSpec {
        let image = PathBuf::from("/data/set/cat_01.png");
        JobSpec {
            index: 0,
            output_path: output_path(output_dir, &image, "COLOR_LAYOUT", &params),
            image,
            descriptor_id: 3,
            descriptor_name: "COLOR_LAYOUT".to_string(),
            parameters: params,
        }
    }

    fn result(job: JobSpec, exit_code: Option<i32>, stdout: &str, classification: Classification) -> JobResult {
        JobResult {
            job,
            exit_code,
            stdout: stdout.to_string(),
            stderr: String::new(),
            classification,
            timed_out: false,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_output_file_name() {
        let params: ParameterAssignment =
            [("NumberOfYCoeff", "64"), ("NumberOfCCoeff", "28")].into_iter().collect();
        assert_eq!(
            output_file_name(Path::new("/d/cat_01.png"), "COLOR_LAYOUT", &params),
            "cat_01_COLOR_LAYOUT_NumberOfYCoeff-64_NumberOfCCoeff-28.txt"
        );
        assert_eq!(
            output_file_name(Path::new("dog.v2.jpg"), "EDGE_HISTOGRAM", &ParameterAssignment::new()),
            "dog.v2_EDGE_HISTOGRAM_default.txt"
        );
    }

    #[tokio::test]
    async fn test_written_header_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let params: ParameterAssignment =
            [("NumberOfYCoeff", "64"), ("NumberOfCCoeff", "28")].into_iter().collect();
        let job = job(temp.path(), params.clone());
        let res = result(job, Some(0), "Descriptor XML:\n<a/>\n", Classification::Success);

        let path = write_result(&res).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        let (metadata, rest) = JobMetadata::split_content(&content).unwrap();
        assert_eq!(metadata.image, "cat_01.png");
        assert_eq!(metadata.descriptor_id, 3);
        assert_eq!(metadata.descriptor_name, "COLOR_LAYOUT");
        assert_eq!(metadata.parameters, params);
        assert_eq!(rest, "Descriptor XML:\n<a/>\n");

        let first_line = content.lines().next().unwrap();
        assert_eq!(
            first_line,
            r#"{"image":"cat_01.png","descriptor_id":3,"descriptor_name":"COLOR_LAYOUT","parameters":{"NumberOfYCoeff":"64","NumberOfCCoeff":"28"}}"#
        );
    }

    #[tokio::test]
    async fn test_hard_failure_still_written() {
        let temp = tempfile::tempdir().unwrap();
        let job = job(temp.path(), ParameterAssignment::new());
        let res = result(job, Some(2), "", Classification::HardFailure);

        let path = write_result(&res).await.unwrap();
        assert!(path.ends_with("cat_01_COLOR_LAYOUT_default.txt"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let job = job(&temp.path().join("missing"), ParameterAssignment::new());
        let res = result(job, Some(0), "<a/>", Classification::Success);

        let err = write_result(&res).await.unwrap_err();
        assert!(matches!(err, ServiceError::Persistence { .. }));
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        assert!(JobMetadata::parse_header("Descriptor XML:").is_err());
        assert!(JobMetadata::split_content("not json\n<a/>").is_err());
    }
}
