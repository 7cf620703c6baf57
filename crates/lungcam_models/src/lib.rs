//! # lungcam_models
//!
//! Classifier side of lungcam.
//!
//! This crate provides:
//! - [`LungResNet`] - ResNet-50 style image classifier with Keras layer names
//! - [`LayeredClassifier`] - forward passes that stop at, or resume from, a named layer
//! - [`OutputArity`] - single vs. multi-head output, resolved once at load time
//! - [`checkpoint`] - weight records and JSON metadata
//! - [`ModelStore`] - load-once cache around the model artifact

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
mod error;
pub mod resnet;
pub mod store;
pub mod traits;

pub use checkpoint::{load_model, save_model, ModelMetadata};
pub use error::{ModelError, Result};
pub use resnet::{Bottleneck, FrozenBatchNorm, LungResNet, LungResNetConfig};
pub use store::{LoadedClassifier, ModelStore};
pub use traits::{LayeredClassifier, ModelOutput, OutputArity};
