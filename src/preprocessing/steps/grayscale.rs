use crate::error::PrepError;
use image::DynamicImage;

/// Convert image to single-channel luminance
/// Already single-channel images pass through untouched
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PrepError> {
    match image {
        DynamicImage::ImageLuma8(_) => Ok(image),
        other => Ok(DynamicImage::ImageLuma8(other.to_luma8())),
    }
}
