//! Error types for lungcam_models.

use std::path::PathBuf;

use thiserror::Error;

use crate::traits::OutputArity;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building, loading or running the classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The requested layer does not exist in the model.
    #[error("Layer '{layer}' not found in model (available: {})", available.join(", "))]
    LayerNotFound {
        /// Requested layer name.
        layer: String,
        /// Names the model does expose.
        available: Vec<String>,
    },

    /// The model artifact could not be loaded.
    #[error("Failed to load model from {}: {reason}", path.display())]
    Load {
        /// Path of the artifact.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Error saving a checkpoint.
    #[error("Failed to save model to {}: {reason}", path.display())]
    Save {
        /// Destination path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Invalid model configuration.
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Model output does not have the arity recorded at load time.
    #[error("Model output mismatch: expected {expected:?}, got {got:?}")]
    OutputMismatch {
        /// Arity resolved at load time.
        expected: OutputArity,
        /// Arity of this output.
        got: OutputArity,
    },

    /// Core error.
    #[error(transparent)]
    Core(#[from] lungcam_core::CoreError),
}
