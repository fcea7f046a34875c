//! Error types for background removal operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RemoveBgError>;

/// Error taxonomy for background removal operations
#[derive(Error, Debug)]
pub enum RemoveBgError {
    /// Input/output errors (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or encode errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration file could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input image does not exist
    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    /// The edge map produced no contour to build a foreground mask from
    #[error("No foreground found: edge detection produced no contours")]
    NoForeground,

    /// A segmentation strategy could not produce a result
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Failure reported by the OpenCV backend
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    /// Processing errors outside of segmentation
    #[error("Processing error: {0}")]
    Processing(String),
}

impl RemoveBgError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create an image-not-found error for a path
    pub fn image_not_found<P: AsRef<Path>>(path: P) -> Self {
        Self::ImageNotFound(path.as_ref().to_path_buf())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether this error means the input image was missing
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ImageNotFound(_))
    }
}
