//! # lungcam
//!
//! Chest X-ray classification with Grad-CAM explanations.
//!
//! A decoded image is resized to the classifier's 256x256 RGB input, a
//! ResNet classifier predicts one of four classes, and a Grad-CAM heatmap
//! over its last convolutional stage shows which regions drove the
//! prediction:
//!
//! - **Preprocessing**: decode, resize and rescale ([`core`])
//! - **Models**: layered ResNet classifier, checkpoints, load-once store ([`models`])
//! - **Explainability**: Grad-CAM heatmaps and overlays ([`explain`])
//! - **Pipeline**: one image in, one [`Diagnosis`] out ([`pipeline`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lungcam::prelude::*;
//!
//! let store = ModelStore::<DiagnosisBackend>::beside_executable(Default::default())?;
//! let diagnoser = Diagnoser::new(store);
//!
//! let diagnosis = diagnoser.diagnose_file("chest.png")?;
//! println!("{}", diagnosis.prediction);
//! diagnosis.save_overlay("chest_gradcam.png")?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod pipeline;

// Re-export all crates
pub use lungcam_core as core;
pub use lungcam_explain as explain;
pub use lungcam_models as models;

pub use error::{DiagnosisError, ErrorKind, Result};
pub use pipeline::{Diagnoser, Diagnosis, DiagnosisReport};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lungcam::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use lungcam_core::backend::DiagnosisBackend;
    pub use lungcam_core::config::{CLASS_NAMES, TARGET_LAYER};
    pub use lungcam_core::{ImageShape, Prediction, Preprocessor};

    // Models
    pub use lungcam_models::{
        load_model, save_model, LayeredClassifier, LungResNet, LungResNetConfig, ModelMetadata,
        ModelStore,
    };

    // Explain
    pub use lungcam_explain::{GradCam, Heatmap};

    // Pipeline
    pub use crate::{Diagnoser, Diagnosis, DiagnosisError, DiagnosisReport, ErrorKind};
}
