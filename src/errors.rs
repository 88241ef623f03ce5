use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for scalar_vision
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Degenerate range: {0}")]
    DegenerateRange(String),

    #[error("Invalid structuring element size: {0}")]
    InvalidStructuringElement(u32),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PNG encoder error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("TIFF codec error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Unsupported raster layout: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

impl VisionError {
    /// Shorthand for a shape mismatch between two `(width, height)` pairs.
    pub fn mismatch(expected: (usize, usize), actual: (usize, usize)) -> Self {
        VisionError::DimensionMismatch { expected, actual }
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, VisionError>;
