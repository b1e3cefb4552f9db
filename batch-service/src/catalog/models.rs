// Catalog Models
// Descriptor specs and the parameter assignments expanded from them

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use std::fmt;

/// A named feature-extraction procedure and its parameter schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSpec {
    /// Stable catalog key passed to the extraction tool
    pub id: u32,
    /// Descriptor name, e.g. `COLOR_LAYOUT`
    pub name: String,
    /// Parameter groups, each expanded independently
    #[serde(default = "default_groups")]
    pub groups: Vec<ParameterGroup>,
}

fn default_groups() -> Vec<ParameterGroup> {
    vec![ParameterGroup::default()]
}

impl DescriptorSpec {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            groups: default_groups(),
        }
    }

    /// Replace the parameter groups
    pub fn with_groups(mut self, groups: Vec<ParameterGroup>) -> Self {
        self.groups = groups;
        self
    }

    /// Aggregation key, `"id (name)"`
    pub fn key(&self) -> String {
        descriptor_key(self.id, &self.name)
    }

    /// File name of this descriptor's combined artifact
    pub fn combined_file_name(&self) -> String {
        format!("combined_{}_results.txt", self.name.to_lowercase())
    }

    /// Number of jobs this descriptor contributes for a single image
    pub fn jobs_per_image(&self) -> usize {
        self.groups.iter().map(ParameterGroup::combination_count).sum()
    }
}

/// Format the `"id (name)"` key used for per-descriptor counters
pub fn descriptor_key(id: u32, name: &str) -> String {
    format!("{} ({})", id, name)
}

/// One group of parameter domains; its Cartesian product yields assignments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroup {
    #[serde(default)]
    pub params: Vec<ParameterDomain>,
}

impl ParameterGroup {
    pub fn new(params: Vec<ParameterDomain>) -> Self {
        Self { params }
    }

    /// Number of assignments in the product (1 for an empty group)
    pub fn combination_count(&self) -> usize {
        self.params.iter().map(|p| p.values.len()).product()
    }

    /// Expand the group into every assignment, first parameter varying slowest.
    ///
    /// The product of zero domains is the single empty assignment.
    pub fn assignments(&self) -> Vec<ParameterAssignment> {
        let mut combos = vec![ParameterAssignment::new()];

        for domain in &self.params {
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    domain.values.iter().map(move |value| {
                        let mut next = base.clone();
                        next.push(domain.name.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }

        combos
    }
}

/// The legal values of one named parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDomain {
    pub name: String,
    pub values: Vec<String>,
}

impl ParameterDomain {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Mapping from parameter name to one chosen value, in declaration order.
/// Serialized as a JSON object whose key order is the assignment order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterAssignment(IndexMap<String, String>);

impl ParameterAssignment {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Append a pair; an existing name keeps its position and takes the new value
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Flatten into `name, value, name, value, ...` command-line arguments
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect()
    }

    /// File-name fragment: `k1-v1_k2-v2`, or `default` when empty
    pub fn file_fragment(&self) -> String {
        if self.0.is_empty() {
            return "default".to_string();
        }
        self.0
            .iter()
            .map(|(k, v)| format!("{}-{}", k, v))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterAssignment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for ParameterAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}
