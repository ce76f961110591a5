use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for FiberSight
#[derive(Error, Debug)]
pub enum FiberSightError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to parse image input {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Edge exclusion was requested without an explicit boundary and the
    /// candidate set did not hold exactly one polygon.
    #[error("Cannot infer outer boundary from {0} candidate boundaries")]
    AmbiguousBoundary(usize),

    #[error("Unknown marker channel: {0}")]
    UnknownChannel(String),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, FiberSightError>;
