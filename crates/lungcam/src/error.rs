//! Per-request errors and their remediation hints.

use std::fmt;

use thiserror::Error;

use lungcam_core::config::MODEL_FILE;
use lungcam_core::CoreError;
use lungcam_explain::ExplainError;
use lungcam_models::ModelError;

/// Result type alias using [`DiagnosisError`].
pub type Result<T> = std::result::Result<T, DiagnosisError>;

/// Any failure of a single diagnosis request.
#[derive(Error, Debug)]
pub enum DiagnosisError {
    /// Input or preprocessing error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Model loading or inference error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Grad-CAM error.
    #[error(transparent)]
    Explain(#[from] ExplainError),

    /// The overlay could not be written.
    #[error("Failed to write overlay: {0}")]
    Encode(#[from] image::ImageError),
}

/// Broad category of a [`DiagnosisError`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The model does not expose the expected layer.
    Configuration,
    /// The model artifact is missing, unreadable or mismatched.
    ModelLoad,
    /// The image could not be read or decoded.
    Input,
    /// Forward pass or gradient computation failed.
    Inference,
    /// The result could not be written.
    Output,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration error",
            Self::ModelLoad => "model load error",
            Self::Input => "input error",
            Self::Inference => "inference error",
            Self::Output => "output error",
        };
        f.write_str(name)
    }
}

impl DiagnosisError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Model(ModelError::LayerNotFound { .. })
            | Self::Explain(ExplainError::LayerNotFound { .. })
            | Self::Explain(ExplainError::Model(ModelError::LayerNotFound { .. })) => {
                ErrorKind::Configuration
            }
            Self::Model(ModelError::Load { .. } | ModelError::InvalidConfig(_)) => {
                ErrorKind::ModelLoad
            }
            Self::Core(CoreError::Decode(_) | CoreError::IoError(_)) => ErrorKind::Input,
            Self::Encode(_) => ErrorKind::Output,
            _ => ErrorKind::Inference,
        }
    }

    /// What the user can do about it, when there is something to do.
    pub fn hint(&self) -> Option<String> {
        match self.kind() {
            ErrorKind::Configuration => {
                Some("check that the model file is the expected ResNet classifier".to_string())
            }
            ErrorKind::ModelLoad => Some(format!(
                "place {MODEL_FILE} and its .json metadata next to the lungcam executable, or pass --model"
            )),
            ErrorKind::Input => Some("supply a readable JPEG or PNG image".to_string()),
            ErrorKind::Inference | ErrorKind::Output => None,
        }
    }
}
