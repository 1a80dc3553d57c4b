//! Output error types

use thiserror::Error;

/// Errors from opening or running an output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No audio output devices found")]
    NoDevices,

    #[error("No default audio output device")]
    NoDefaultDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Recording failed: {0}")]
    Record(#[from] hound::Error),

    #[error("Failed to spawn output thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
