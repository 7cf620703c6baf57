//! # lungcam_explain
//!
//! Explainability for lungcam: Grad-CAM heatmaps and their overlays.
//!
//! This crate provides:
//! - [`GradCam`] - gradient-weighted class activation maps for a named layer
//! - [`Heatmap`] - normalized 2-D saliency map with upscaling
//! - [`render`] - jet colormap and alpha-blended overlays

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod gradcam;
mod heatmap;
pub mod render;

pub use error::{ExplainError, Result};
pub use gradcam::{compute_heatmap, Explanation, GradCam};
pub use heatmap::Heatmap;
