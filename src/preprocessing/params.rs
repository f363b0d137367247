//! Parameterized pipeline builder.
//!
//! Client options arrive as raw strings. Unlike category dispatch, nothing
//! here ever fails: every value is coerced, and anything unusable falls back
//! to its documented default.

use crate::error::PrepError;
use crate::preprocessing::pipeline::Pipeline;
use crate::preprocessing::steps::{self, morphology::MorphOp, KernelSize};
use image::DynamicImage;
use std::collections::HashMap;

pub const NOISE_REDUCTION: &str = "noiseReduction";
pub const BLUR_KERNEL_SIZE: &str = "blurKernelSize";
pub const CONTRAST_ADJUSTMENT: &str = "contrastAdjustment";
pub const EDGE_DETECTION: &str = "edgeDetection";
pub const CANNY_THRESHOLD_LOW: &str = "cannyThreshold1";
pub const CANNY_THRESHOLD_HIGH: &str = "cannyThreshold2";
pub const MORPHOLOGICAL_OPERATION: &str = "morphologicalOperation";
pub const MORPH_OPERATION_TYPE: &str = "morphOperationType";
pub const MORPH_KERNEL_SIZE: &str = "morphKernelSize";

/// Every option name the builder reads
pub const OPTION_NAMES: [&str; 9] = [
    NOISE_REDUCTION,
    BLUR_KERNEL_SIZE,
    CONTRAST_ADJUSTMENT,
    EDGE_DETECTION,
    CANNY_THRESHOLD_LOW,
    CANNY_THRESHOLD_HIGH,
    MORPHOLOGICAL_OPERATION,
    MORPH_OPERATION_TYPE,
    MORPH_KERNEL_SIZE,
];

const DEFAULT_BLUR_KERNEL: i64 = 5;
const DEFAULT_CANNY_LOW: i64 = 100;
const DEFAULT_CANNY_HIGH: i64 = 200;
const DEFAULT_MORPH_KERNEL: i64 = 3;

/// Raw option name to value mapping, exactly as the client sent it
#[derive(Debug, Clone, Default)]
pub struct PipelineParameters {
    raw: HashMap<String, String>,
}

/// Normalized settings, one field per enabled stage
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSettings {
    pub noise_reduction: Option<u32>,
    pub contrast_adjustment: bool,
    pub edge_detection: Option<(u32, u32)>,
    pub morphology: Option<(MorphOp, u32)>,
}

impl PipelineParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.raw.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Unset or unrecognised values are disabled
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(parse_bool).unwrap_or(false)
    }

    /// Integer coercion: "7" and "7.9" both give 7; anything else gives `default`
    pub fn integer(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(parse_int).unwrap_or(default)
    }

    pub fn kernel(&self, name: &str, default: i64) -> KernelSize {
        KernelSize::coerce(self.integer(name, default))
    }

    /// Coerce every option into its stage setting
    pub fn settings(&self) -> CustomSettings {
        let noise_reduction = self
            .flag(NOISE_REDUCTION)
            .then(|| self.kernel(BLUR_KERNEL_SIZE, DEFAULT_BLUR_KERNEL).get());

        let edge_detection = self.flag(EDGE_DETECTION).then(|| {
            let low = self.integer(CANNY_THRESHOLD_LOW, DEFAULT_CANNY_LOW).clamp(0, 1024) as u32;
            let high = self.integer(CANNY_THRESHOLD_HIGH, DEFAULT_CANNY_HIGH).clamp(0, 1024) as u32;
            (low, high)
        });

        let morphology = self.flag(MORPHOLOGICAL_OPERATION).then(|| {
            let op = self
                .get(MORPH_OPERATION_TYPE)
                .and_then(MorphOp::parse)
                .unwrap_or_default();
            (op, self.kernel(MORPH_KERNEL_SIZE, DEFAULT_MORPH_KERNEL).get())
        });

        CustomSettings {
            noise_reduction,
            contrast_adjustment: self.flag(CONTRAST_ADJUSTMENT),
            edge_detection,
            morphology,
        }
    }
}

impl FromIterator<(String, String)> for PipelineParameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            raw: iter.into_iter().collect(),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64)
}

/// Apply the enabled stages in their fixed order: noise reduction, contrast
/// adjustment, edge detection, morphology. With nothing enabled the input
/// comes back untouched.
pub fn build(
    pipeline: &mut Pipeline,
    img: DynamicImage,
    params: &PipelineParameters,
) -> Result<DynamicImage, PrepError> {
    let settings = params.settings();
    tracing::debug!("Custom pipeline settings: {:?}", settings);

    let mut img = img;

    if let Some(kernel) = settings.noise_reduction {
        img = pipeline.run_step("gaussian_blur", img, |i| {
            steps::blur::apply(i, KernelSize::coerce(kernel as i64))
        })?;
    }

    if settings.contrast_adjustment {
        img = pipeline.run_step("equalize_histogram", img, steps::contrast::equalize)?;
    }

    if let Some((low, high)) = settings.edge_detection {
        img = pipeline.run_step("canny", img, |i| {
            steps::edges::apply(i, low as f32, high as f32)
        })?;
    }

    if let Some((op, kernel)) = settings.morphology {
        img = pipeline.run_step(&format!("morph_{}", op.as_str()), img, |i| {
            steps::morphology::apply(i, op, KernelSize::coerce(kernel as i64))
        })?;
    }

    Ok(img)
}
