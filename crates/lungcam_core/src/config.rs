//! Fixed configuration shared by every crate.
//!
//! These values are tied to how the reference classifier was trained and are
//! not user-configurable.

/// Class labels, index-aligned with the classifier's probability vector.
pub const CLASS_NAMES: [&str; 4] = ["Covid-19", "Normal", "Viral Pneumonia", "Bacterial Pneumonia"];

/// Number of classes the classifier must output.
pub const N_CLASSES: usize = CLASS_NAMES.len();

/// Layer explained by Grad-CAM: output of the final residual block.
pub const TARGET_LAYER: &str = "conv5_block3_out";

/// Side length of the square classifier input.
pub const INPUT_SIZE: usize = 256;

/// Number of color channels of the classifier input.
pub const INPUT_CHANNELS: usize = 3;

/// Denominator used when a heatmap has no positive value.
pub const HEATMAP_EPSILON: f32 = 1e-10;

/// Blend weight of the original image in the overlay.
pub const ORIGINAL_WEIGHT: f32 = 0.6;

/// Blend weight of the colored heatmap in the overlay.
pub const HEATMAP_WEIGHT: f32 = 0.4;

/// File name of the model weights, looked up next to the executable.
pub const MODEL_FILE: &str = "lung_disease_model.mpk";
