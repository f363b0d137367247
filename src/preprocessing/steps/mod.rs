//! Transform primitive library
//!
//! Every primitive is a deterministic, side-effect-free function from an
//! image plus validated parameters to a new image. The output channel depth
//! is documented on each function.

pub mod blur;
pub mod brighten;
pub mod contrast;
pub mod denoise;
pub mod edges;
pub mod grayscale;
pub mod morphology;
pub mod resize;
pub mod sharpen;
pub mod threshold;

use crate::error::PrepError;
use std::time::{Duration, Instant};

/// A Gaussian blur or morphology kernel size: always odd, within 1..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSize(u32);

impl KernelSize {
    pub const MAX: u32 = 255;

    /// Smallest odd size that is at least `requested` (and at least 1).
    ///
    /// Requests above [`KernelSize::MAX`] are capped to it, so the result
    /// can be smaller than the request there.
    pub fn coerce(requested: i64) -> Self {
        let size = requested.clamp(1, i64::from(Self::MAX)) as u32;
        if size % 2 == 0 {
            Self(size + 1)
        } else {
            Self(size)
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Half-width of the square window, excluding the centre pixel
    pub fn radius(self) -> u32 {
        self.0 / 2
    }
}

/// Cut-off for long-running primitives, checked between rows or tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn unbounded() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn check(self) -> Result<(), PrepError> {
        match self.0 {
            Some(at) if Instant::now() >= at => Err(PrepError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
