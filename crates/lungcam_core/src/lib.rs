//! # lungcam_core
//!
//! Core types for lungcam chest X-ray diagnosis.
//!
//! This crate provides:
//! - [`config`] compile-time constants (class labels, target layer, input size)
//! - [`ImageShape`] for image tensor shape metadata
//! - [`Preprocessor`] turning decoded images into classifier input tensors
//! - [`Prediction`] for the predicted label and confidence
//! - Error types and backend aliases
//!
//! ## Shape Convention
//!
//! Classifier input follows the channels-last convention `(N, H, W, C)`:
//! - `N`: Batch size (always 1 for a single request)
//! - `H`, `W`: Spatial resolution (256x256)
//! - `C`: Color channels (RGB)
//!
//! ## Example
//!
//! ```rust,ignore
//! use lungcam_core::{backend::NdArray, Preprocessor};
//!
//! let preprocessor = Preprocessor::default();
//! let image = Preprocessor::decode(&bytes)?;
//! let input = preprocessor.to_tensor::<NdArray>(&image, &Default::default())?;
//! assert_eq!(input.dims(), [1, 256, 256, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod error;
mod prediction;
mod preprocess;
mod shape;

pub use error::{CoreError, Result};
pub use prediction::{argmax, Prediction};
pub use preprocess::Preprocessor;
pub use shape::ImageShape;

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;
    pub use burn_ndarray::NdArray;

    /// CPU backend with gradient tracking, used for Grad-CAM.
    pub type DiagnosisBackend = Autodiff<NdArray>;
}
