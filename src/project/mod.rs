pub mod docs;
pub mod manifest;

pub use docs::{load_docs, ModuleDocs};
pub use manifest::{elm_home, find_manifest_for, Dependency, Manifest, ManifestError};
