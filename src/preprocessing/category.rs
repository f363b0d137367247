//! Strategy registry: one hand-tuned primitive composition per category.
//!
//! Dispatch is an exhaustive match on [`Category`], so adding a category
//! without a strategy does not compile. Label parsing is the only place an
//! unknown category can appear, and it fails before any primitive runs.

use crate::error::PrepError;
use crate::preprocessing::pipeline::Pipeline;
use crate::preprocessing::steps::{self, morphology::MorphOp, KernelSize};
use image::DynamicImage;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    LicensePlate,
    TableImage,
    DarkBackground,
    FarAwayText,
    AiGenerated,
}

/// Fixed composition applied top to bottom
pub type FixedStrategy = fn(&mut Pipeline, DynamicImage) -> Result<DynamicImage, PrepError>;

/// How a category produces its image
pub enum Strategy {
    Fixed(FixedStrategy),
    /// Program synthesized per request by the generative service
    Generated,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::LicensePlate,
        Category::TableImage,
        Category::DarkBackground,
        Category::FarAwayText,
        Category::AiGenerated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicensePlate => "license-plate",
            Self::TableImage => "table-image",
            Self::DarkBackground => "dark-background",
            Self::FarAwayText => "far-away-text",
            Self::AiGenerated => "ai-generated",
        }
    }

    pub fn strategy(self) -> Strategy {
        match self {
            Self::LicensePlate => Strategy::Fixed(license_plate),
            Self::TableImage => Strategy::Fixed(table_image),
            Self::DarkBackground => Strategy::Fixed(dark_background),
            Self::FarAwayText => Strategy::Fixed(far_away_text),
            Self::AiGenerated => Strategy::Generated,
        }
    }
}

impl FromStr for Category {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "license-plate" => Ok(Self::LicensePlate),
            "table-image" | "tables" => Ok(Self::TableImage),
            "dark-background" => Ok(Self::DarkBackground),
            "far-away-text" => Ok(Self::FarAwayText),
            "ai-generated" | "ai-preprocessing" => Ok(Self::AiGenerated),
            _ => Err(PrepError::UnknownCategory(s.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn license_plate(p: &mut Pipeline, img: DynamicImage) -> Result<DynamicImage, PrepError> {
    let img = p.run_step("grayscale", img, steps::grayscale::apply)?;
    let img = p.run_step("gaussian_blur", img, |i| {
        steps::blur::apply(i, KernelSize::coerce(5))
    })?;
    let img = p.run_step("binarize", img, |i| steps::threshold::binarize(i, 11, 2))?;
    let img = p.run_step("morph_close", img, |i| {
        steps::morphology::apply(i, MorphOp::Close, KernelSize::coerce(3))
    })?;
    p.run_step("canny_union", img, |i| steps::edges::union(i, 100.0, 200.0))
}

fn table_image(p: &mut Pipeline, img: DynamicImage) -> Result<DynamicImage, PrepError> {
    let img = p.run_step("grayscale", img, steps::grayscale::apply)?;
    let img = p.run_step("equalize_histogram", img, steps::contrast::equalize)?;
    let img = p.run_step("binarize", img, |i| steps::threshold::binarize(i, 15, 4))?;
    p.run_step("morph_open", img, |i| {
        steps::morphology::apply(i, MorphOp::Open, KernelSize::coerce(3))
    })
}

/// Brightening path: stays in color, never binarizes
fn dark_background(p: &mut Pipeline, img: DynamicImage) -> Result<DynamicImage, PrepError> {
    let img = p.run_step("brighten", img, |i| steps::brighten::apply(i, 1.5, 20.0))?;
    let img = p.run_step("clahe", img, |i| steps::contrast::clahe(i, 2.0, 8))?;
    p.run_step("denoise_color", img, steps::denoise::apply)
}

fn far_away_text(p: &mut Pipeline, img: DynamicImage) -> Result<DynamicImage, PrepError> {
    let img = p.run_step("upscale_sharpen", img, steps::resize::upscale_sharpen)?;
    let img = p.run_step("grayscale", img, steps::grayscale::apply)?;
    let img = p.run_step("gaussian_blur", img, |i| {
        steps::blur::apply(i, KernelSize::coerce(3))
    })?;
    p.run_step("binarize", img, |i| steps::threshold::binarize(i, 11, 2))
}
