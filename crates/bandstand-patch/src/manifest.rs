//! The patch manifest and its serializable description.

use crate::error::{PatchError, Result};
use serde::{Deserialize, Serialize};

/// Manifest files end with this suffix; the manifest's parent directory
/// roots the source tree.
pub const MANIFEST_SUFFIX: &str = ".patch";

/// Parsed manifest contents.
#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default, rename = "isInstrument")]
    pub is_instrument: bool,
    #[serde(default)]
    pub source: SourceRefs,
}

/// The manifest's `source` entry: a single path or a list of paths,
/// relative to the manifest's directory.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceRefs {
    One(String),
    Many(Vec<String>),
}

impl Default for SourceRefs {
    fn default() -> Self {
        SourceRefs::Many(Vec::new())
    }
}

impl SourceRefs {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            SourceRefs::One(path) => std::slice::from_ref(path),
            SourceRefs::Many(paths) => paths,
        };
        slice.iter().map(String::as_str)
    }
}

#[derive(Deserialize)]
struct ManifestDocument {
    patch: Manifest,
}

/// Parses manifest JSON of the form `{ "patch": { "ID": ..., ... } }`.
pub fn parse_manifest(json: &str) -> Result<Manifest> {
    let document: ManifestDocument =
        serde_json::from_str(json).map_err(|err| PatchError::Manifest(err.to_string()))?;
    if document.patch.id.is_empty() {
        return Err(PatchError::Manifest("manifest ID must not be empty".into()));
    }
    Ok(document.patch)
}

/// What a patch says about itself. After any refresh attempt a description
/// exists: either manifest-derived, or a stub carrying the load error.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Description {
    pub uid: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub manufacturer: String,
    pub is_instrument: bool,
    /// Path of the manifest this description came from.
    pub manifest_file: String,
    /// Present when the last refresh failed; the other fields are then
    /// whatever could be salvaged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl Description {
    pub fn from_manifest(manifest: &Manifest, manifest_path: &str) -> Self {
        Self {
            uid: manifest.id.clone(),
            version: manifest.version.clone(),
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            category: manifest.category.clone(),
            manufacturer: manifest.manufacturer.clone(),
            is_instrument: manifest.is_instrument,
            manifest_file: manifest_path.to_owned(),
            load_error: None,
        }
    }

    pub fn from_error(manifest_path: &str, message: impl Into<String>) -> Self {
        Self {
            manifest_file: manifest_path.to_owned(),
            load_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.load_error.is_some()
    }
}
