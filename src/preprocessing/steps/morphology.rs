use crate::error::PrepError;
use crate::preprocessing::steps::KernelSize;
use image::{DynamicImage, GrayImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

/// Morphological operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphOp {
    /// Dilate then erode: bridges small gaps inside strokes
    #[default]
    Close,
    /// Erode then dilate: removes specks smaller than the kernel
    Open,
}

impl MorphOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "close" | "closing" => Some(Self::Close),
            "open" | "opening" => Some(Self::Open),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Open => "open",
        }
    }
}

/// Apply `op` with a square structuring element of side `kernel`.
/// Foreground is any non-zero pixel. Output: Luma8.
pub fn apply(
    image: DynamicImage,
    op: MorphOp,
    kernel: KernelSize,
) -> Result<DynamicImage, PrepError> {
    Ok(DynamicImage::ImageLuma8(morph(&image.to_luma8(), op, kernel)))
}

pub fn morph(gray: &GrayImage, op: MorphOp, kernel: KernelSize) -> GrayImage {
    // The L-infinity ball of radius r is the (2r+1) square
    let radius = kernel.radius().min(u8::MAX as u32) as u8;
    if radius == 0 {
        return gray.clone();
    }
    match op {
        MorphOp::Close => close(gray, Norm::LInf, radius),
        MorphOp::Open => open(gray, Norm::LInf, radius),
    }
}
