use crate::comparison::{self, ComparisonResult};
use crate::config::ProgramLimits;
use crate::error::PrepError;
use crate::preprocessing::{
    self, params, Category, Pipeline, PipelineParameters, PreprocessingResult, Strategy,
};
use crate::program;
use crate::vision::{ImagePayload, VisionService};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;

/// Request-level entry points over the pipelines and the model service.
/// Every method is blocking and owns nothing between calls.
pub struct PrepEngine {
    service: Arc<dyn VisionService>,
    limits: ProgramLimits,
}

impl PrepEngine {
    pub fn new(service: Arc<dyn VisionService>, limits: ProgramLimits) -> Self {
        Self { service, limits }
    }

    pub fn service(&self) -> &dyn VisionService {
        self.service.as_ref()
    }

    pub fn limits(&self) -> ProgramLimits {
        self.limits
    }

    /// Grayscale, blur, adaptive threshold, close
    pub fn preprocess_default(&self, bytes: &[u8]) -> Result<PreprocessingResult, PrepError> {
        let image = preprocessing::decode(bytes)?;
        let mut pipeline = Pipeline::new("default");
        let out = preprocessing::default_pipeline(&mut pipeline, image)?;
        Ok(pipeline.finish(out))
    }

    /// `deadline` bounds a generated program's execution; fixed strategies
    /// ignore it.
    pub fn preprocess_category(
        &self,
        bytes: &[u8],
        label: &str,
        deadline: Option<Instant>,
    ) -> Result<PreprocessingResult, PrepError> {
        // Aliases are recorded under the canonical category name
        let category: Category = label.parse()?;
        let mut pipeline = Pipeline::new(category.as_str());
        let out = self.run_category_label(category.as_str(), bytes, deadline, &mut pipeline)?;
        Ok(pipeline.finish(out))
    }

    /// Run a category's strategy, recording every step in `pipeline`.
    /// The label is checked before the image is even decoded.
    pub fn run_category_label(
        &self,
        label: &str,
        bytes: &[u8],
        deadline: Option<Instant>,
        pipeline: &mut Pipeline,
    ) -> Result<DynamicImage, PrepError> {
        let category: Category = label.parse()?;
        let image = preprocessing::decode(bytes)?;
        match category.strategy() {
            Strategy::Fixed(strategy) => strategy(pipeline, image),
            Strategy::Generated => program::synthesize_and_run(
                self.service.as_ref(),
                bytes,
                &image,
                self.limits,
                deadline,
                pipeline,
            ),
        }
    }

    /// Apply the client-selected stages. Only decoding can fail here.
    pub fn preprocess_custom(
        &self,
        bytes: &[u8],
        parameters: &PipelineParameters,
    ) -> Result<PreprocessingResult, PrepError> {
        let image = preprocessing::decode(bytes)?;
        let mut pipeline = Pipeline::new("custom");
        let out = params::build(&mut pipeline, image, parameters)?;
        Ok(pipeline.finish(out))
    }

    pub fn extract_text(&self, bytes: &[u8]) -> Result<String, PrepError> {
        // Reject non-images before spending an upstream call
        preprocessing::decode(bytes)?;
        self.service.extract_text(ImagePayload::sniff(bytes))
    }

    pub fn compare(
        &self,
        baseline: &[u8],
        preprocessed: &[u8],
    ) -> Result<ComparisonResult, PrepError> {
        comparison::compare(self.service.as_ref(), baseline, preprocessed)
    }
}
