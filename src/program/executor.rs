//! Bounded interpreter for transform programs.
//!
//! The sandbox holds three slots: the untouched input, the working image and
//! the output. Programs can only move data between those slots and call the
//! primitives their instructions name.

use super::instruction::Instruction;
use super::{Program, ProgramError};
use crate::config::ProgramLimits;
use crate::error::PrepError;
use crate::preprocessing::steps::{self, morphology::MorphOp, Deadline, KernelSize};
use crate::preprocessing::Pipeline;
use image::DynamicImage;
use std::time::Instant;

pub struct Sandbox<'a> {
    input: &'a DynamicImage,
    limits: ProgramLimits,
    deadline: Option<Instant>,
}

impl<'a> Sandbox<'a> {
    pub fn new(input: &'a DynamicImage, limits: ProgramLimits) -> Self {
        Self {
            input,
            limits,
            deadline: None,
        }
    }

    /// Stop at `at` even if the program's own time budget runs longer
    pub fn with_deadline(mut self, at: Option<Instant>) -> Self {
        self.deadline = at;
        self
    }

    /// Run every instruction in order and return the output slot.
    ///
    /// Step count and parameters are checked before anything runs. Before
    /// each step the remaining time is compared with the step's estimated
    /// cost on the current image, and long primitives stop mid-way once the
    /// deadline passes.
    pub fn execute(
        &self,
        program: &Program,
        pipeline: &mut Pipeline,
    ) -> Result<DynamicImage, ProgramError> {
        let count = program.steps.len();
        if count > self.limits.max_steps {
            return Err(ProgramError::TooManySteps {
                count,
                max: self.limits.max_steps,
            });
        }

        for (index, step) in program.steps.iter().enumerate() {
            step.validate()
                .map_err(|message| ProgramError::InvalidParameter {
                    index,
                    op: step.name(),
                    message,
                })?;
        }

        let started = Instant::now();
        let budget_end = started.checked_add(self.limits.time_budget);
        let deadline = match (budget_end, self.deadline) {
            (Some(budget), Some(request)) => Some(budget.min(request)),
            (budget, request) => budget.or(request),
        };
        let budget_ms = deadline
            .map_or(self.limits.time_budget, |at| at.saturating_duration_since(started))
            .as_millis() as u64;
        let deadline = deadline.map_or_else(Deadline::unbounded, Deadline::at);
        let over_budget = |index| ProgramError::TimeBudget { index, budget_ms };

        let mut working = self.input.clone();
        let mut output = None;

        for (index, step) in program.steps.iter().enumerate() {
            if let Some(remaining) = deadline.remaining() {
                let estimate = step.estimated_cost(working.width(), working.height());
                if remaining.is_zero() || estimate > remaining {
                    tracing::debug!(
                        "Step {} ({}) needs about {}ms, {}ms left",
                        index,
                        step.name(),
                        estimate.as_millis(),
                        remaining.as_millis()
                    );
                    return Err(over_budget(index));
                }
            }

            match step {
                Instruction::LoadInput => working = self.input.clone(),
                Instruction::Output => output = Some(working.clone()),
                _ => {
                    working = pipeline
                        .run_step(step.name(), working, |img| apply(step, img, deadline))
                        .map_err(|e| match e {
                            PrepError::DeadlineExceeded => over_budget(index),
                            e => ProgramError::StepFailed {
                                index,
                                op: step.name(),
                                message: e.to_string(),
                            },
                        })?;

                    let pixels = working.width() as u64 * working.height() as u64;
                    if pixels > self.limits.max_pixels {
                        return Err(ProgramError::ImageTooLarge {
                            index,
                            op: step.name(),
                            pixels,
                            max: self.limits.max_pixels,
                        });
                    }
                }
            }
        }

        output.ok_or(ProgramError::NoOutput)
    }
}

fn apply(
    step: &Instruction,
    img: DynamicImage,
    deadline: Deadline,
) -> Result<DynamicImage, PrepError> {
    match *step {
        Instruction::Grayscale => steps::grayscale::apply(img),
        Instruction::GaussianBlur { kernel_size } => {
            steps::blur::apply(img, KernelSize::coerce(kernel_size))
        }
        Instruction::AdaptiveThreshold { block_size, c } => {
            steps::threshold::adaptive_until(img, block_size, c, deadline)
        }
        Instruction::OtsuThreshold => steps::threshold::otsu(img),
        Instruction::Binarize { block_size, c } => {
            steps::threshold::binarize_until(img, block_size, c, deadline)
        }
        Instruction::MorphClose { kernel_size } => {
            steps::morphology::apply(img, MorphOp::Close, KernelSize::coerce(kernel_size))
        }
        Instruction::MorphOpen { kernel_size } => {
            steps::morphology::apply(img, MorphOp::Open, KernelSize::coerce(kernel_size))
        }
        Instruction::Canny { low, high } => steps::edges::apply(img, low, high),
        Instruction::CannyUnion { low, high } => steps::edges::union(img, low, high),
        Instruction::EqualizeHistogram => steps::contrast::equalize(img),
        Instruction::Clahe {
            clip_limit,
            tile_grid,
        } => steps::contrast::clahe_until(img, clip_limit, tile_grid, deadline),
        Instruction::UpscaleSharpen => steps::resize::upscale_sharpen(img),
        Instruction::DenoiseColor => steps::denoise::apply_until(img, deadline),
        Instruction::Brighten { alpha, beta } => steps::brighten::apply(img, alpha, beta),
        // Slot moves are handled by the sandbox
        Instruction::LoadInput | Instruction::Output => Ok(img),
    }
}
