//! Normalized saliency map.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::Array2;

use crate::error::{ExplainError, Result};

/// 2-D saliency map with values in `[0, 1]`, indexed `[row, col]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    values: Array2<f32>,
}

impl Heatmap {
    /// Build a heatmap from row-major values.
    pub fn from_shape_vec(height: usize, width: usize, values: Vec<f32>) -> Result<Self> {
        let values = Array2::from_shape_vec((height, width), values)
            .map_err(|e| ExplainError::ShapeMismatch(e.to_string()))?;
        Ok(Self { values })
    }

    /// Underlying array.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// `(height, width)` of the map.
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Largest value, `0.0` for an empty map.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Smallest value, `0.0` for an empty map.
    pub fn min(&self) -> f32 {
        self.values
            .iter()
            .copied()
            .reduce(f32::min)
            .unwrap_or(0.0)
    }

    /// True when no region contributed positively to the prediction.
    pub fn is_degenerate(&self) -> bool {
        self.max() == 0.0
    }

    /// Bilinear resize to `width` x `height` pixels, clamped to `[0, 1]`.
    pub fn upscale(&self, width: u32, height: u32) -> Result<Self> {
        let (rows, cols) = self.dims();
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(cols as u32, rows as u32, self.values.iter().copied().collect())
                .ok_or_else(|| {
                    ExplainError::ShapeMismatch(format!("cannot view {rows}x{cols} map as image"))
                })?;

        let resized = imageops::resize(&buffer, width, height, FilterType::Triangle);
        let values = resized.into_raw().into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
        Self::from_shape_vec(height as usize, width as usize, values)
    }

    /// Quantize to 8-bit intensities, `u8(255 * v)`.
    pub fn to_u8(&self) -> Array2<u8> {
        self.values.mapv(|v| (255.0 * v.clamp(0.0, 1.0)) as u8)
    }
}
