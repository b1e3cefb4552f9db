// Catalog Loading
// Built-in MPEG-7 catalog, YAML catalogs, validation and descriptor selection

use crate::catalog::models::{DescriptorSpec, ParameterDomain, ParameterGroup};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lowest and highest descriptor ids the extraction tool accepts
pub const MIN_DESCRIPTOR_ID: u32 = 1;
pub const MAX_DESCRIPTOR_ID: u32 = 10;

/// Errors that can occur while loading or selecting from a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Descriptor id {0} is outside 1..=10")]
    InvalidId(u32),

    #[error("Descriptor id {0} is declared more than once")]
    DuplicateId(u32),

    #[error("Descriptor {0} has an empty name")]
    EmptyName(u32),

    #[error("Descriptor name '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("Descriptor {descriptor} declares parameter '{param}' twice in one group")]
    DuplicateParameter { descriptor: String, param: String },

    #[error("Descriptor {descriptor} parameter '{param}' has no allowed values")]
    EmptyDomain { descriptor: String, param: String },

    #[error("No valid descriptor selected (requested: {0:?})")]
    NoDescriptorSelected(Vec<u32>),
}

/// Ordered set of descriptors available for extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub descriptors: Vec<DescriptorSpec>,
}

impl Catalog {
    pub fn new(descriptors: Vec<DescriptorSpec>) -> Self {
        Self { descriptors }
    }

    /// The ten MPEG-7 descriptors with their default extraction parameters
    pub fn builtin() -> Self {
        fn single(params: Vec<ParameterDomain>) -> Vec<ParameterGroup> {
            vec![ParameterGroup::new(params)]
        }

        Self::new(vec![
            DescriptorSpec::new(1, "DOMINANT_COLOR").with_groups(single(vec![
                ParameterDomain::new("VariancePresent", ["1"]),
                ParameterDomain::new("SpatialCoherency", ["1"]),
            ])),
            DescriptorSpec::new(2, "SCALABLE_COLOR").with_groups(single(vec![
                ParameterDomain::new("NumberOfCoefficients", ["256"]),
                ParameterDomain::new("NumberOfBitplanesDiscarded", ["4"]),
            ])),
            DescriptorSpec::new(3, "COLOR_LAYOUT").with_groups(single(vec![
                ParameterDomain::new("NumberOfYCoeff", ["64"]),
                ParameterDomain::new("NumberOfCCoeff", ["64"]),
            ])),
            DescriptorSpec::new(4, "COLOR_STRUCTURE").with_groups(single(vec![
                ParameterDomain::new("ColorQuantSize", ["256"]),
            ])),
            DescriptorSpec::new(5, "CT_BROWSING"),
            DescriptorSpec::new(6, "HOMOGENEOUS_TEXTURE")
                .with_groups(single(vec![ParameterDomain::new("layer", ["1"])])),
            DescriptorSpec::new(7, "TEXTURE_BROWSING")
                .with_groups(single(vec![ParameterDomain::new("layer", ["1"])])),
            DescriptorSpec::new(8, "EDGE_HISTOGRAM"),
            DescriptorSpec::new(9, "REGION_SHAPE"),
            DescriptorSpec::new(10, "CONTOUR_SHAPE"),
        ])
    }

    /// Parse a catalog from YAML and validate it
    pub fn from_yaml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Check ids, names and parameter domains
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();

        for spec in &self.descriptors {
            if !(MIN_DESCRIPTOR_ID..=MAX_DESCRIPTOR_ID).contains(&spec.id) {
                return Err(CatalogError::InvalidId(spec.id));
            }
            if !ids.insert(spec.id) {
                return Err(CatalogError::DuplicateId(spec.id));
            }
            if spec.name.trim().is_empty() {
                return Err(CatalogError::EmptyName(spec.id));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(CatalogError::DuplicateName(spec.name.clone()));
            }

            for group in &spec.groups {
                let mut params = HashSet::new();
                for domain in &group.params {
                    if !params.insert(domain.name.as_str()) {
                        return Err(CatalogError::DuplicateParameter {
                            descriptor: spec.key(),
                            param: domain.name.clone(),
                        });
                    }
                    if domain.values.is_empty() {
                        return Err(CatalogError::EmptyDomain {
                            descriptor: spec.key(),
                            param: domain.name.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&DescriptorSpec> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Active subset in catalog order. An empty selector selects everything;
    /// unknown ids are skipped.
    pub fn select(&self, ids: &[u32]) -> Result<Catalog, CatalogError> {
        if ids.is_empty() {
            if self.descriptors.is_empty() {
                return Err(CatalogError::NoDescriptorSelected(Vec::new()));
            }
            return Ok(self.clone());
        }

        for id in ids {
            if self.get(*id).is_none() {
                tracing::warn!(descriptor_id = id, "ignoring unknown descriptor id");
            }
        }

        let selected: Vec<DescriptorSpec> = self
            .descriptors
            .iter()
            .filter(|d| ids.contains(&d.id))
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(CatalogError::NoDescriptorSelected(ids.to_vec()));
        }

        Ok(Catalog::new(selected))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
