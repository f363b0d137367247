use crate::error::PrepError;
use crate::preprocessing::steps::sharpen;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};

/// Upscale factor in percent
pub const UPSCALE_PERCENT: u32 = 200;
/// Maximum dimension to avoid memory issues
const MAX_DIMENSION: u32 = 8000;

/// Enlarge small or distant text with cubic interpolation, then sharpen it
/// with the fixed 3x3 kernel. Output: Luma8; growth stops at
/// `MAX_DIMENSION` on the long side.
pub fn upscale_sharpen(image: DynamicImage) -> Result<DynamicImage, PrepError> {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = target_dimensions(width, height);

    let gray = image.to_luma8();
    let enlarged = if (new_width, new_height) == (width, height) {
        gray
    } else {
        imageops::resize(&gray, new_width, new_height, FilterType::CatmullRom)
    };
    Ok(DynamicImage::ImageLuma8(sharpen::sharpen_gray(&enlarged)))
}

fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let scale = UPSCALE_PERCENT as f32 / 100.0;
    let mut new_width = ((width as f32 * scale).round() as u32).max(1);
    let mut new_height = ((height as f32 * scale).round() as u32).max(1);

    // Clamp to max dimension, keeping the aspect ratio
    if new_width > MAX_DIMENSION || new_height > MAX_DIMENSION {
        let max_dim = new_width.max(new_height);
        let scale_down = MAX_DIMENSION as f32 / max_dim as f32;
        new_width = ((new_width as f32 * scale_down) as u32).max(1);
        new_height = ((new_height as f32 * scale_down) as u32).max(1);
    }

    // Never shrink
    (new_width.max(width), new_height.max(height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn test_upscale_doubles_dimensions() {
        let img = RgbImage::new(100, 40);
        let result = upscale_sharpen(DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(result.width(), 200);
        assert_eq!(result.height(), 80);
        assert!(matches!(result, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_upscale_limits_large_image() {
        assert_eq!(target_dimensions(6000, 3000), (MAX_DIMENSION, 4000));
    }

    #[test]
    fn test_upscale_handles_single_pixel() {
        let img = GrayImage::new(1, 1);
        let result = upscale_sharpen(DynamicImage::ImageLuma8(img)).unwrap();
        assert_eq!(result.dimensions(), (2, 2));
    }
}
