// Descriptor Catalog Module
// Descriptor specs, parameter domains and catalog loading

pub mod loader;
pub mod models;

// Re-export key types
pub use loader::{Catalog, CatalogError};
pub use models::{DescriptorSpec, ParameterAssignment, ParameterDomain, ParameterGroup};
