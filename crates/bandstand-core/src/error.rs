//! Error types for bandstand-core.

use thiserror::Error;

/// Error type for bandstand-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid requirements: {0}")]
    InvalidRequirements(String),

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Failed to enumerate devices")]
    Devices(#[from] cpal::DevicesError),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Endpoint {0} has an unsupported frame type")]
    UnsupportedFrameType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
