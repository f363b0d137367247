//! Gaussian blur for noise reduction.
//!
//! The kernel size follows the odd-window convention of document tooling;
//! the Gaussian sigma is derived from it the same way OpenCV does when no
//! explicit sigma is given. The filter has exactly `k` taps per axis, so a
//! pixel never sees input further than `k / 2` away.

use crate::error::PrepError;
use crate::preprocessing::steps::KernelSize;
use image::DynamicImage;
use imageproc::filter::separable_filter_equal;

/// Sigma implied by an odd kernel size
pub fn sigma_for(kernel: KernelSize) -> f32 {
    0.3 * ((kernel.get() as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1-D Gaussian with `kernel.get()` taps
pub fn gaussian_taps(kernel: KernelSize) -> Vec<f32> {
    let sigma = sigma_for(kernel);
    let radius = kernel.radius() as i32;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Blur with a square Gaussian kernel. Output has the input's channel depth
/// (Luma8, Rgb8 or Rgba8; other layouts are converted to Rgb8).
pub fn apply(image: DynamicImage, kernel: KernelSize) -> Result<DynamicImage, PrepError> {
    // A 1x1 Gaussian kernel is the identity
    if kernel.get() <= 1 {
        return Ok(image);
    }
    let taps = gaussian_taps(kernel);

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(separable_filter_equal(&gray, &taps))
        }
        DynamicImage::ImageRgba8(rgba) => {
            DynamicImage::ImageRgba8(separable_filter_equal(&rgba, &taps))
        }
        other => DynamicImage::ImageRgb8(separable_filter_equal(&other.to_rgb8(), &taps)),
    })
}
