//! Image preprocessing module for OCR enhancement
//!
//! Provides the transform primitives, the fixed category strategies and the
//! client-parameterized pipeline builder.

pub mod category;
pub mod params;
pub mod pipeline;
pub mod steps;

pub use category::{Category, Strategy};
pub use params::PipelineParameters;
pub use pipeline::{Pipeline, PreprocessingResult, StepTiming};

use crate::error::PrepError;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Decode an uploaded byte buffer, sniffing the format from its contents
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PrepError> {
    if bytes.is_empty() {
        return Err(PrepError::Decode("empty image payload".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| PrepError::Decode(e.to_string()))
}

/// Encode as PNG, the only format the preprocess endpoints return
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PrepError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PrepError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Default pipeline used by the plain preprocess operation:
/// grayscale, blur(5), adaptive threshold(11, 2), close(3)
pub fn default_pipeline(
    pipeline: &mut Pipeline,
    img: DynamicImage,
) -> Result<DynamicImage, PrepError> {
    let img = pipeline.run_step("grayscale", img, steps::grayscale::apply)?;
    let img = pipeline.run_step("gaussian_blur", img, |i| {
        steps::blur::apply(i, steps::KernelSize::coerce(5))
    })?;
    let img = pipeline.run_step("adaptive_threshold", img, |i| {
        steps::threshold::adaptive(i, 11, 2)
    })?;
    pipeline.run_step("morph_close", img, |i| {
        steps::morphology::apply(
            i,
            steps::morphology::MorphOp::Close,
            steps::KernelSize::coerce(3),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not an image"), Err(PrepError::Decode(_))));
        assert!(matches!(decode(&[]), Err(PrepError::Decode(_))));
    }

    #[test]
    fn test_png_round_trip_keeps_pixels() {
        let gray = GrayImage::from_fn(6, 4, |x, y| Luma([(x * 40 + y) as u8]));
        let img = DynamicImage::ImageLuma8(gray);
        let bytes = encode_png(&img).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.to_luma8(), img.to_luma8());
    }

    #[test]
    fn test_default_pipeline_binarizes() {
        let mut pipeline = Pipeline::new("default");
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(30, 30, |x, _| {
            if x % 5 == 0 { Luma([10]) } else { Luma([230]) }
        }));
        let out = default_pipeline(&mut pipeline, img).unwrap();
        let result = pipeline.finish(out);
        assert_eq!(
            result.step_names(),
            vec!["grayscale", "gaussian_blur", "adaptive_threshold", "morph_close"]
        );
        assert!(matches!(result.image, DynamicImage::ImageLuma8(_)));
    }
}
