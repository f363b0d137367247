//! Per-image transform programs synthesized by the generative service.
//!
//! A reply is parsed into a [`Program`] of closed [`Instruction`]s and run by
//! a bounded [`Sandbox`]. Nothing in a reply is ever evaluated as code.

pub mod executor;
pub mod generate;
pub mod instruction;
pub mod parser;

pub use executor::Sandbox;
pub use generate::{generate, GeneratedProgram, SourceImage};
pub use instruction::Instruction;

use crate::config::ProgramLimits;
use crate::error::PrepError;
use crate::preprocessing::Pipeline;
use crate::vision::VisionService;
use image::DynamicImage;
use std::time::Instant;
use thiserror::Error;

/// Parsed program, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub steps: Vec<Instruction>,
}

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("could not parse program: {0}")]
    Parse(String),

    #[error("program has no steps")]
    Empty,

    #[error("program finished without designating an output")]
    NoOutput,

    #[error("program has {count} steps (max: {max})")]
    TooManySteps { count: usize, max: usize },

    #[error("step {index} ({op}): {message}")]
    InvalidParameter {
        index: usize,
        op: &'static str,
        message: String,
    },

    #[error("time budget of {budget_ms}ms exhausted before step {index}")]
    TimeBudget { index: usize, budget_ms: u64 },

    #[error("step {index} ({op}) failed: {message}")]
    StepFailed {
        index: usize,
        op: &'static str,
        message: String,
    },

    #[error("step {index} ({op}) produced {pixels} pixels (max: {max})")]
    ImageTooLarge {
        index: usize,
        op: &'static str,
        pixels: u64,
        max: u64,
    },
}

impl From<ProgramError> for PrepError {
    fn from(err: ProgramError) -> Self {
        match err {
            ProgramError::Parse(_) | ProgramError::Empty | ProgramError::NoOutput => {
                PrepError::Generation(err.to_string())
            }
            _ => PrepError::Execution(err.to_string()),
        }
    }
}

/// Generate a program for `image`, then run it in the sandbox.
/// Fails without a fallback image when generation or execution fails.
/// Execution stops at `deadline` when one is given.
pub fn synthesize_and_run(
    service: &dyn VisionService,
    bytes: &[u8],
    image: &DynamicImage,
    limits: ProgramLimits,
    deadline: Option<Instant>,
    pipeline: &mut Pipeline,
) -> Result<DynamicImage, PrepError> {
    let generated = generate(service, bytes, image)?;
    run_generated(&generated, bytes, image, limits, deadline, pipeline)
}

/// Parse and execute `generated` against the image it was generated for
pub fn run_generated(
    generated: &GeneratedProgram,
    bytes: &[u8],
    image: &DynamicImage,
    limits: ProgramLimits,
    deadline: Option<Instant>,
    pipeline: &mut Pipeline,
) -> Result<DynamicImage, PrepError> {
    if !generated.is_for(bytes, image) {
        return Err(PrepError::Internal(format!(
            "program for image {} applied to a different image",
            &generated.image.digest[..12]
        )));
    }

    let result = parser::parse(&generated.source).and_then(|program| {
        tracing::info!(
            "Running generated program for {}: {} steps",
            &generated.image.digest[..12],
            program.steps.len()
        );
        Sandbox::new(image, limits)
            .with_deadline(deadline)
            .execute(&program, pipeline)
    });

    result.map_err(|e| {
        tracing::warn!("Generated program rejected: {}", e);
        PrepError::from(e)
    })
}
