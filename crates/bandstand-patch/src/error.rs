//! Error types for bandstand-patch.

use thiserror::Error;

/// Failure while refreshing or loading a patch. Never fatal to the host;
/// the facade folds these into description stubs or failed-player messages.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{0}")]
    LoadFailed(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Cannot find file {0}")]
    MissingFile(String),
}

impl PatchError {
    /// The human-readable message carried into stubs and compile messages.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, PatchError>;
