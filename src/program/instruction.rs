//! Closed instruction set for generated transform programs.
//!
//! A program is data: a list of `{"op": ..., params}` records. Only the
//! opcodes below exist, and each one maps onto exactly one primitive.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

const KERNEL_RANGE: RangeInclusive<i64> = 1..=31;
const BLOCK_RANGE: RangeInclusive<u32> = 3..=101;
const C_RANGE: RangeInclusive<i32> = -50..=50;
const CANNY_RANGE: RangeInclusive<f32> = 0.0..=1024.0;
const CLIP_RANGE: RangeInclusive<f32> = 0.01..=40.0;
const TILE_RANGE: RangeInclusive<u32> = 1..=64;
const ALPHA_RANGE: RangeInclusive<f32> = 0.01..=4.0;
const BETA_RANGE: RangeInclusive<f32> = -128.0..=128.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Grayscale,
    GaussianBlur {
        #[serde(default = "default_blur_kernel")]
        kernel_size: i64,
    },
    AdaptiveThreshold {
        #[serde(default = "default_block_size")]
        block_size: u32,
        #[serde(default = "default_c")]
        c: i32,
    },
    OtsuThreshold,
    /// Adaptive threshold with Otsu fallback
    Binarize {
        #[serde(default = "default_block_size")]
        block_size: u32,
        #[serde(default = "default_c")]
        c: i32,
    },
    MorphClose {
        #[serde(default = "default_morph_kernel")]
        kernel_size: i64,
    },
    MorphOpen {
        #[serde(default = "default_morph_kernel")]
        kernel_size: i64,
    },
    Canny {
        #[serde(default = "default_canny_low")]
        low: f32,
        #[serde(default = "default_canny_high")]
        high: f32,
    },
    /// Canny edges OR-ed into the current binary image
    CannyUnion {
        #[serde(default = "default_canny_low")]
        low: f32,
        #[serde(default = "default_canny_high")]
        high: f32,
    },
    EqualizeHistogram,
    Clahe {
        #[serde(default = "default_clip_limit")]
        clip_limit: f32,
        #[serde(default = "default_tile_grid")]
        tile_grid: u32,
    },
    UpscaleSharpen,
    DenoiseColor,
    Brighten {
        #[serde(default = "default_alpha")]
        alpha: f32,
        #[serde(default = "default_beta")]
        beta: f32,
    },
    /// Reset the working image to the program input
    LoadInput,
    /// Copy the working image into the output slot
    Output,
}

fn default_blur_kernel() -> i64 {
    5
}
fn default_morph_kernel() -> i64 {
    3
}
fn default_block_size() -> u32 {
    11
}
fn default_c() -> i32 {
    2
}
fn default_canny_low() -> f32 {
    100.0
}
fn default_canny_high() -> f32 {
    200.0
}
fn default_clip_limit() -> f32 {
    2.0
}
fn default_tile_grid() -> u32 {
    8
}
fn default_alpha() -> f32 {
    1.5
}
fn default_beta() -> f32 {
    20.0
}

impl Instruction {
    /// Opcode as written in programs and recorded in step timings
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::GaussianBlur { .. } => "gaussian_blur",
            Self::AdaptiveThreshold { .. } => "adaptive_threshold",
            Self::OtsuThreshold => "otsu_threshold",
            Self::Binarize { .. } => "binarize",
            Self::MorphClose { .. } => "morph_close",
            Self::MorphOpen { .. } => "morph_open",
            Self::Canny { .. } => "canny",
            Self::CannyUnion { .. } => "canny_union",
            Self::EqualizeHistogram => "equalize_histogram",
            Self::Clahe { .. } => "clahe",
            Self::UpscaleSharpen => "upscale_sharpen",
            Self::DenoiseColor => "denoise_color",
            Self::Brighten { .. } => "brighten",
            Self::LoadInput => "load_input",
            Self::Output => "output",
        }
    }

    /// Check every parameter against its documented range
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::GaussianBlur { kernel_size }
            | Self::MorphClose { kernel_size }
            | Self::MorphOpen { kernel_size } => check("kernel_size", kernel_size, &KERNEL_RANGE),
            Self::AdaptiveThreshold { block_size, c } | Self::Binarize { block_size, c } => {
                check("block_size", block_size, &BLOCK_RANGE)?;
                if block_size % 2 == 0 {
                    return Err(format!("block_size must be odd, got {}", block_size));
                }
                check("c", c, &C_RANGE)
            }
            Self::Canny { low, high } | Self::CannyUnion { low, high } => {
                check("low", low, &CANNY_RANGE)?;
                check("high", high, &CANNY_RANGE)
            }
            Self::Clahe {
                clip_limit,
                tile_grid,
            } => {
                check("clip_limit", clip_limit, &CLIP_RANGE)?;
                check("tile_grid", tile_grid, &TILE_RANGE)
            }
            Self::Brighten { alpha, beta } => {
                check("alpha", alpha, &ALPHA_RANGE)?;
                check("beta", beta, &BETA_RANGE)
            }
            Self::Grayscale
            | Self::OtsuThreshold
            | Self::EqualizeHistogram
            | Self::UpscaleSharpen
            | Self::DenoiseColor
            | Self::LoadInput
            | Self::Output => Ok(()),
        }
    }

    /// Lower bound on the time this step takes per input pixel, in nanoseconds
    fn nanos_per_pixel(&self) -> u64 {
        match *self {
            Self::LoadInput | Self::Output => 0,
            Self::Grayscale | Self::OtsuThreshold | Self::EqualizeHistogram => 2,
            Self::Brighten { .. } => 2,
            // Two passes over kernel_size taps
            Self::GaussianBlur { kernel_size } => 2 * kernel_size.clamp(1, 255) as u64,
            Self::AdaptiveThreshold { .. } | Self::Binarize { .. } => 10,
            Self::Clahe { .. } => 10,
            Self::MorphClose { .. } | Self::MorphOpen { .. } => 20,
            Self::Canny { .. } | Self::CannyUnion { .. } => 30,
            // Output has four times the input's pixels
            Self::UpscaleSharpen => 60,
            // Two passes of 7x7 search over 3x3 patches in three channels
            Self::DenoiseColor => 1_000,
        }
    }

    /// Lower bound on the time this step takes on a `width` x `height` image
    pub fn estimated_cost(&self, width: u32, height: u32) -> Duration {
        let pixels = u64::from(width) * u64::from(height);
        Duration::from_nanos(pixels.saturating_mul(self.nanos_per_pixel()))
    }

    /// One line per opcode, used to describe the vocabulary to the generator
    pub fn vocabulary() -> &'static str {
        r#"{"op": "grayscale"}  -- color to single-channel luminance
{"op": "gaussian_blur", "kernel_size": 5}  -- odd kernel 1..31
{"op": "adaptive_threshold", "block_size": 11, "c": 2}  -- local mean binarization, dark text becomes white
{"op": "otsu_threshold"}  -- global binarization, dark text becomes white
{"op": "binarize", "block_size": 11, "c": 2}  -- adaptive threshold falling back to Otsu
{"op": "morph_close", "kernel_size": 3}  -- fill small gaps in strokes
{"op": "morph_open", "kernel_size": 3}  -- remove small specks
{"op": "canny", "low": 100, "high": 200}  -- replace the image with its edge map
{"op": "canny_union", "low": 100, "high": 200}  -- add edges to a binary image
{"op": "equalize_histogram"}  -- global contrast normalization
{"op": "clahe", "clip_limit": 2.0, "tile_grid": 8}  -- local contrast on luminance, keeps color
{"op": "upscale_sharpen"}  -- enlarge 200% and sharpen, for small or distant text
{"op": "denoise_color"}  -- non-local means smoothing for brightened low-light photos
{"op": "brighten", "alpha": 1.5, "beta": 20}  -- linear gain for dark photos
{"op": "load_input"}  -- restart from the original image
{"op": "output"}  -- designate the current image as the result (required)"#
    }
}

fn check<T: PartialOrd + std::fmt::Display>(
    name: &str,
    value: &T,
    range: &RangeInclusive<T>,
) -> Result<(), String> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(format!(
            "{} must be within {}..={}, got {}",
            name,
            range.start(),
            range.end(),
            value
        ))
    }
}
