//! Heatmap colorization and overlay onto the original image.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::debug;

use lungcam_core::config::{HEATMAP_WEIGHT, ORIGINAL_WEIGHT};

use crate::error::Result;
use crate::heatmap::Heatmap;

/// Jet colormap: blue for 0, through cyan, yellow, to red for 255.
pub fn jet(value: u8) -> Rgb<u8> {
    let v = f32::from(value) / 255.0;
    let channel = |center: f32| {
        let c = (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Upscale a heatmap to `width` x `height` and apply the jet colormap.
pub fn colorize(heatmap: &Heatmap, width: u32, height: u32) -> Result<RgbImage> {
    let intensities = heatmap.upscale(width, height)?.to_u8();
    Ok(RgbImage::from_fn(width, height, |x, y| {
        jet(intensities[[y as usize, x as usize]])
    }))
}

/// Blend the colored heatmap over the original image,
/// `0.6 * original + 0.4 * heatmap`.
///
/// The result has the original's pixel dimensions.
pub fn overlay(original: &DynamicImage, heatmap: &Heatmap) -> Result<RgbImage> {
    let (width, height) = original.dimensions();
    let base = original.to_rgb8();
    let colored = colorize(heatmap, width, height)?;

    let blended = RgbImage::from_fn(width, height, |x, y| {
        let a = base.get_pixel(x, y).0;
        let b = colored.get_pixel(x, y).0;
        Rgb(std::array::from_fn(|i| {
            let v = ORIGINAL_WEIGHT * f32::from(a[i]) + HEATMAP_WEIGHT * f32::from(b[i]);
            v.round().clamp(0.0, 255.0) as u8
        }))
    });

    debug!(width, height, "Rendered Grad-CAM overlay");
    Ok(blended)
}
