// Result Combiner
// Post-pass merging per-job files into global and per-descriptor artifacts

use crate::catalog::{Catalog, DescriptorSpec};
use crate::error::{ServiceError, ServiceResult};
use crate::output::writer::JobMetadata;

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Name of the combined file holding every job
pub const GLOBAL_COMBINED_FILE: &str = "combined_results.txt";

/// Whether a file name is one of the combiner's own artifacts
pub fn is_combined_artifact(file_name: &str) -> bool {
    file_name == GLOBAL_COMBINED_FILE
        || (file_name.starts_with("combined_") && file_name.ends_with("_results.txt"))
}

/// Per-job output files in `output_dir`, sorted by file name
pub fn per_job_files(output_dir: &Path) -> ServiceResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".txt") && !is_combined_artifact(&name) {
            files.push(entry.path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Summary of one combiner pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineReport {
    /// Global combined file
    pub global_path: PathBuf,
    /// Per-descriptor combined files, in catalog order
    pub descriptor_paths: Vec<PathBuf>,
    /// Per-job files appended to the global file
    pub files: usize,
    /// Files appended per descriptor key
    pub per_descriptor: BTreeMap<String, usize>,
    /// Files whose metadata header could not be parsed
    pub unparsed: usize,
    /// Files whose descriptor is not in the active set
    pub inactive: usize,
    /// Files that could not be read at all
    pub unreadable: usize,
}

/// Run a combiner pass on the blocking pool
pub async fn combine_outputs(catalog: Catalog, output_dir: PathBuf) -> ServiceResult<CombineReport> {
    tokio::task::spawn_blocking(move || Combiner::new(&catalog).combine(&output_dir))
        .await
        .map_err(|e| ServiceError::Task(format!("combiner: {}", e)))?
}

/// Merges per-job output files after the parallel phase has drained
pub struct Combiner<'a> {
    catalog: &'a Catalog,
}

struct DescriptorSink {
    key: String,
    writer: BufWriter<File>,
    path: PathBuf,
}

impl<'a> Combiner<'a> {
    /// `catalog` is the active descriptor set
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn combine(&self, output_dir: &Path) -> ServiceResult<CombineReport> {
        let inputs = per_job_files(output_dir)?;

        let global_path = output_dir.join(GLOBAL_COMBINED_FILE);
        let mut global = create_sink(&global_path, "# Combined results for all descriptors")?;

        // Pre-create every descriptor file so empty descriptors still get one
        let mut sinks: HashMap<u32, DescriptorSink> = HashMap::new();
        let mut descriptor_paths = Vec::with_capacity(self.catalog.len());
        for spec in &self.catalog.descriptors {
            let path = output_dir.join(spec.combined_file_name());
            let writer = create_sink(&path, &descriptor_header(spec))?;
            descriptor_paths.push(path.clone());
            sinks.insert(
                spec.id,
                DescriptorSink {
                    key: spec.key(),
                    writer,
                    path,
                },
            );
        }

        let mut report = CombineReport {
            global_path: global_path.clone(),
            descriptor_paths,
            ..Default::default()
        };

        for input in &inputs {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let content = match fs::read(input) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!(file = %input.display(), "skipping unreadable result file: {}", e);
                    report.unreadable += 1;
                    continue;
                }
            };

            append_entry(&mut global, &name, &content)
                .map_err(|e| ServiceError::persistence(&global_path, e))?;
            report.files += 1;

            match JobMetadata::split_content(&content) {
                Ok((metadata, _)) => match sinks.get_mut(&metadata.descriptor_id) {
                    Some(sink) => {
                        append_entry(&mut sink.writer, &name, &content)
                            .map_err(|e| ServiceError::persistence(&sink.path, e))?;
                        *report.per_descriptor.entry(sink.key.clone()).or_insert(0) += 1;
                    }
                    None => report.inactive += 1,
                },
                Err(e) => {
                    tracing::warn!(file = %name, "could not parse metadata header: {}", e);
                    report.unparsed += 1;
                }
            }
        }

        global
            .flush()
            .map_err(|e| ServiceError::persistence(&global_path, e))?;
        for sink in sinks.values_mut() {
            sink.writer
                .flush()
                .map_err(|e| ServiceError::persistence(&sink.path, e))?;
        }

        tracing::info!(
            files = report.files,
            unparsed = report.unparsed,
            "combined results written to {}",
            global_path.display()
        );
        Ok(report)
    }
}

fn descriptor_header(spec: &DescriptorSpec) -> String {
    format!("# Combined results for {}", spec.key())
}

fn create_sink(path: &Path, header: &str) -> ServiceResult<BufWriter<File>> {
    let file = File::create(path).map_err(|e| ServiceError::persistence(path, e))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", header).map_err(|e| ServiceError::persistence(path, e))?;
    writeln!(writer).map_err(|e| ServiceError::persistence(path, e))?;
    Ok(writer)
}

fn append_entry(writer: &mut impl Write, name: &str, content: &str) -> std::io::Result<()> {
    writeln!(writer, "# File: {}", name)?;
    writer.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        writeln!(writer)?;
    }
    writeln!(writer)
}
