use crate::error::PrepError;
use image::{DynamicImage, GrayImage};
use imageproc::filter::filter3x3;

/// Laplacian-based sharpening kernel
/// Center weight 5, 4-neighbours -1 each
pub const KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Apply the fixed 3x3 sharpening kernel to luminance. Output: Luma8.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PrepError> {
    Ok(DynamicImage::ImageLuma8(sharpen_gray(&image.to_luma8())))
}

pub fn sharpen_gray(gray: &GrayImage) -> GrayImage {
    filter3x3(gray, &KERNEL)
}
