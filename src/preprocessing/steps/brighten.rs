use crate::error::PrepError;
use image::{DynamicImage, Rgb};

/// Linear gain `clamp(alpha * v + beta)` on every color channel.
/// Output: Rgb8.
pub fn apply(image: DynamicImage, alpha: f32, beta: f32) -> Result<DynamicImage, PrepError> {
    if !(alpha.is_finite() && alpha > 0.0 && beta.is_finite()) {
        return Err(PrepError::InvalidRequest(format!(
            "brighten needs a positive gain and finite offset, got alpha={} beta={}",
            alpha, beta
        )));
    }

    let mut rgb = image.into_rgb8();
    for pixel in rgb.pixels_mut() {
        *pixel = Rgb(pixel.0.map(|v| (alpha * v as f32 + beta).round().clamp(0.0, 255.0) as u8));
    }
    Ok(DynamicImage::ImageRgb8(rgb))
}
