//! Error types for lungcam_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised while preparing input or reading predictions.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// The image could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Probability vector length does not match the label set.
    #[error("Classifier returned {got} probabilities, expected {expected}")]
    LabelMismatch {
        /// Number of labels.
        expected: usize,
        /// Number of probabilities.
        got: usize,
    },

    /// Tensor data could not be read back.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
