use crate::error::PrepError;
use image::DynamicImage;
use serde::Serialize;
use std::time::Instant;

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    /// Preprocessed image (not serialized)
    #[serde(skip)]
    pub image: DynamicImage,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Pipeline label (category name, "default" or "custom")
    pub pipeline: String,
    /// Individual step timings, in execution order
    pub steps: Vec<StepTiming>,
}

impl PreprocessingResult {
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Sequential step runner. Every primitive a pipeline invokes goes through
/// `run_step`, which records it; nothing runs without leaving a timing.
pub struct Pipeline {
    label: String,
    start: Instant,
    steps: Vec<StepTiming>,
}

impl Pipeline {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
            steps: Vec::new(),
        }
    }

    /// Steps executed so far
    pub fn steps(&self) -> &[StepTiming] {
        &self.steps
    }

    pub fn run_step<F>(
        &mut self,
        name: &str,
        img: DynamicImage,
        step_fn: F,
    ) -> Result<DynamicImage, PrepError>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage, PrepError>,
    {
        let step_start = Instant::now();
        let result = step_fn(img)?;
        self.steps.push(StepTiming {
            name: name.to_string(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }

    pub fn finish(self, image: DynamicImage) -> PreprocessingResult {
        let total_time_ms = self.start.elapsed().as_millis() as u64;
        tracing::info!(
            "Pipeline {} finished in {}ms: [{}]",
            self.label,
            total_time_ms,
            self.steps
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        PreprocessingResult {
            image,
            total_time_ms,
            pipeline: self.label,
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::steps;
    use image::GrayImage;

    #[test]
    fn test_steps_are_recorded_in_order() {
        let mut pipeline = Pipeline::new("test");
        let img = DynamicImage::ImageLuma8(GrayImage::new(8, 8));
        let img = pipeline
            .run_step("grayscale", img, steps::grayscale::apply)
            .unwrap();
        let img = pipeline.run_step("otsu", img, steps::threshold::otsu).unwrap();

        let result = pipeline.finish(img);
        assert_eq!(result.step_names(), vec!["grayscale", "otsu"]);
        assert_eq!(result.pipeline, "test");
    }

    #[test]
    fn test_failed_step_is_not_recorded() {
        let mut pipeline = Pipeline::new("test");
        let img = DynamicImage::ImageLuma8(GrayImage::new(8, 8));
        let err = pipeline.run_step("broken", img, |_| {
            Err(PrepError::Internal("boom".to_string()))
        });

        assert!(err.is_err());
        assert!(pipeline.steps().is_empty());
    }
}
