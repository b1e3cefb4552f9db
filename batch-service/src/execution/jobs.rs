// Job Expansion
// Expands images x descriptors x parameter combinations into concrete jobs

use crate::catalog::models::descriptor_key;
use crate::catalog::{Catalog, ParameterAssignment};
use crate::output::writer::output_path;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One concrete invocation: one image, one descriptor, one assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Position in the generated sequence
    pub index: usize,
    pub image: PathBuf,
    pub descriptor_id: u32,
    pub descriptor_name: String,
    pub parameters: ParameterAssignment,
    /// Derived per-job output file
    pub output_path: PathBuf,
}

impl JobSpec {
    /// Image file name with extension
    pub fn image_file_name(&self) -> String {
        self.image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image.to_string_lossy().into_owned())
    }

    /// Tool arguments: `descriptorId imagePath [name value]...`
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2 + self.parameters.len() * 2);
        args.push(self.descriptor_id.to_string());
        args.push(self.image.to_string_lossy().into_owned());
        args.extend(self.parameters.to_args());
        args
    }

    /// Aggregation key, `"id (name)"`
    pub fn descriptor_key(&self) -> String {
        descriptor_key(self.descriptor_id, &self.descriptor_name)
    }

    /// Short human-readable description for logs
    pub fn label(&self) -> String {
        format!(
            "{} with {} {}",
            self.image_file_name(),
            self.descriptor_name,
            self.parameters
        )
    }
}

/// Job expander for a descriptor catalog
pub struct JobExpander;

impl JobExpander {
    /// Expand every image against every descriptor and parameter group.
    ///
    /// Order is image, then descriptor (catalog order), then group
    /// (declaration order), then assignment (first parameter slowest), so
    /// identical inputs always give an identical sequence.
    pub fn expand(catalog: &Catalog, images: &[PathBuf], output_dir: &Path) -> Vec<JobSpec> {
        let mut jobs = Vec::with_capacity(Self::count(catalog, images.len()));

        for image in images {
            for spec in &catalog.descriptors {
                for group in &spec.groups {
                    for parameters in group.assignments() {
                        let output_path = output_path(output_dir, image, &spec.name, &parameters);
                        jobs.push(JobSpec {
                            index: jobs.len(),
                            image: image.clone(),
                            descriptor_id: spec.id,
                            descriptor_name: spec.name.clone(),
                            parameters,
                            output_path,
                        });
                    }
                }
            }
        }

        let collisions = Self::output_collisions(&jobs);
        if collisions > 0 {
            tracing::warn!(
                collisions,
                "jobs share output paths (images with the same file stem); later results overwrite earlier ones"
            );
        }

        jobs
    }

    /// Number of jobs `expand` produces for `image_count` images
    pub fn count(catalog: &Catalog, image_count: usize) -> usize {
        image_count
            * catalog
                .descriptors
                .iter()
                .map(|d| d.jobs_per_image())
                .sum::<usize>()
    }

    /// Number of jobs whose output path repeats an earlier job's
    pub fn output_collisions(jobs: &[JobSpec]) -> usize {
        let mut seen = HashSet::with_capacity(jobs.len());
        jobs.iter()
            .filter(|job| !seen.insert(job.output_path.as_path()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::{DescriptorSpec, ParameterDomain, ParameterGroup};

    fn images(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/data").join(n)).collect()
    }

    #[test]
    fn test_single_descriptor_two_values_two_images() {
        let catalog = Catalog::new(vec![DescriptorSpec::new(1, "D").with_groups(vec![
            ParameterGroup::new(vec![ParameterDomain::new("k", ["0", "1"])]),
        ])]);
        let imgs = images(&["img1.png", "img2.png"]);

        let jobs = JobExpander::expand(&catalog, &imgs, Path::new("/out"));

        let order: Vec<(String, Option<&str>)> = jobs
            .iter()
            .map(|j| (j.image_file_name(), j.parameters.get("k")))
            .collect();
        assert_eq!(
            order,
            vec![
                ("img1.png".to_string(), Some("0")),
                ("img1.png".to_string(), Some("1")),
                ("img2.png".to_string(), Some("0")),
                ("img2.png".to_string(), Some("1")),
            ]
        );
        assert_eq!(jobs.iter().map(|j| j.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_job_count_formula() {
        let catalog = Catalog::new(vec![
            DescriptorSpec::new(3, "COLOR_LAYOUT").with_groups(vec![
                ParameterGroup::new(vec![
                    ParameterDomain::new("NumberOfYCoeff", ["3", "6", "64"]),
                    ParameterDomain::new("NumberOfCCoeff", ["3", "28"]),
                ]),
                ParameterGroup::new(vec![ParameterDomain::new("NumberOfYCoeff", ["21"])]),
            ]),
            DescriptorSpec::new(8, "EDGE_HISTOGRAM"),
        ]);
        let imgs = images(&["a.png", "b.png", "c.png"]);

        let jobs = JobExpander::expand(&catalog, &imgs, Path::new("/out"));
        // 3 images x ((3*2 + 1) + 1)
        assert_eq!(jobs.len(), 24);
        assert_eq!(JobExpander::count(&catalog, imgs.len()), 24);

        let edge: Vec<_> = jobs.iter().filter(|j| j.descriptor_id == 8).collect();
        assert_eq!(edge.len(), 3);
        assert!(edge.iter().all(|j| j.parameters.is_empty()));
        assert!(edge[0].output_path.ends_with("a_EDGE_HISTOGRAM_default.txt"));
    }

    #[test]
    fn test_expand_is_deterministic() {
        let catalog = Catalog::builtin();
        let imgs = images(&["x.png", "y.jpg"]);

        let first = JobExpander::expand(&catalog, &imgs, Path::new("/out"));
        let second = JobExpander::expand(&catalog, &imgs, Path::new("/out"));
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
    }

    #[test]
    fn test_command_args() {
        let catalog = Catalog::builtin().select(&[3]).unwrap();
        let jobs = JobExpander::expand(&catalog, &images(&["cat.png"]), Path::new("/out"));

        assert_eq!(
            jobs[0].command_args(),
            vec!["3", "/data/cat.png", "NumberOfYCoeff", "64", "NumberOfCCoeff", "64"]
        );
        assert_eq!(jobs[0].descriptor_key(), "3 (COLOR_LAYOUT)");
        assert_eq!(
            jobs[0].output_path,
            PathBuf::from("/out/cat_COLOR_LAYOUT_NumberOfYCoeff-64_NumberOfCCoeff-64.txt")
        );
    }

    #[test]
    fn test_output_collisions_detected() {
        let catalog = Catalog::builtin().select(&[8]).unwrap();
        let imgs = vec![PathBuf::from("/data/a/cat.png"), PathBuf::from("/data/b/cat.jpg")];

        let jobs = JobExpander::expand(&catalog, &imgs, Path::new("/out"));
        assert_eq!(JobExpander::output_collisions(&jobs), 1);
    }

    #[test]
    fn test_no_images_no_jobs() {
        let jobs = JobExpander::expand(&Catalog::builtin(), &[], Path::new("/out"));
        assert!(jobs.is_empty());
    }
}
