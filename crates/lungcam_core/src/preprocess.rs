//! Image decoding and normalization to the classifier input contract.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::config::{INPUT_CHANNELS, INPUT_SIZE};
use crate::error::Result;
use crate::shape::ImageShape;

/// Turns decoded images into `(1, 256, 256, 3)` tensors with values in `[0, 1]`.
///
/// Images of any resolution are resized (bilinear) to the fixed input size;
/// 8-bit channel intensities are divided by 255.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    size: u32,
    filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            size: INPUT_SIZE as u32,
            filter: FilterType::Triangle,
        }
    }
}

impl Preprocessor {
    /// Decode raw image bytes (JPEG, PNG) into an image.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        let image = image::load_from_memory(bytes)?;
        debug!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "Decoded image"
        );
        Ok(image)
    }

    /// Read and decode an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<DynamicImage> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    /// Shape of the tensors produced by this preprocessor.
    #[must_use]
    pub fn output_shape(&self) -> ImageShape {
        let size = self.size as usize;
        ImageShape::new(1, size, size, INPUT_CHANNELS)
    }

    /// Resize to the input resolution and convert to RGB.
    pub fn resize(&self, image: &DynamicImage) -> RgbImage {
        if image.width() == self.size && image.height() == self.size {
            return image.to_rgb8();
        }
        image
            .resize_exact(self.size, self.size, self.filter)
            .to_rgb8()
    }

    /// Normalized pixel values in row-major `(H, W, C)` order.
    pub fn to_pixels(&self, image: &DynamicImage) -> Vec<f32> {
        self.resize(image)
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect()
    }

    /// Build the batch-shaped input tensor for the classifier.
    pub fn to_tensor<B: Backend>(
        &self,
        image: &DynamicImage,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>> {
        let shape = self.output_shape();
        let data = TensorData::new(self.to_pixels(image), shape.as_array());
        let tensor = Tensor::<B, 4>::from_data(data, device);
        Self::validate(&tensor)?;
        Ok(tensor)
    }

    /// Reject tensors that do not match the classifier input contract.
    pub fn validate<B: Backend>(tensor: &Tensor<B, 4>) -> Result<()> {
        ImageShape::from(tensor.dims()).ensure(&ImageShape::model_input())
    }
}
