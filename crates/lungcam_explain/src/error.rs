//! Error types for lungcam_explain.

use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing or rendering an explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The target layer does not exist in the classifier.
    #[error("Layer '{layer}' not found in the classifier")]
    LayerNotFound {
        /// Requested layer name.
        layer: String,
        /// Layers the classifier exposes.
        available: Vec<String>,
    },

    /// No gradient reached the target layer.
    #[error("No gradient recorded for layer '{0}'")]
    MissingGradient(String),

    /// Activation and gradient shapes disagree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Tensor data could not be read back.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Invalid input.
    #[error(transparent)]
    Core(#[from] lungcam_core::CoreError),

    /// Model error.
    #[error(transparent)]
    Model(#[from] lungcam_models::ModelError),
}
