//! Hosted model service boundary
//!
//! Text extraction and text generation are delegated to an external model.
//! The engine only sees the [`VisionService`] trait, so tests and alternative
//! backends can be injected without touching the pipelines.

pub mod openai;

use crate::error::PrepError;

/// An image handed to the model service as an opaque payload
#[derive(Debug, Clone, Copy)]
pub struct ImagePayload<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'static str,
}

impl<'a> ImagePayload<'a> {
    /// Sniff the MIME type from the encoded bytes, defaulting to PNG
    pub fn sniff(bytes: &'a [u8]) -> Self {
        let mime_type = image::guess_format(bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/png");
        Self { bytes, mime_type }
    }
}

/// A generation request: an instruction plus optional image and text context
#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub system: Option<&'a str>,
    pub instruction: &'a str,
    pub image: Option<ImagePayload<'a>>,
}

/// Capabilities consumed from the external model service.
/// Every failure surfaces as [`PrepError::Upstream`]; calls are not retried.
pub trait VisionService: Send + Sync {
    /// Returns the service identifier (e.g., "openai")
    fn name(&self) -> &'static str;

    /// Model the service is configured to call
    fn model(&self) -> &str;

    /// Extract the text visible in an image
    fn extract_text(&self, image: ImagePayload<'_>) -> Result<String, PrepError>;

    /// Generate free text (a transform program or a feedback narrative)
    fn generate(&self, prompt: Prompt<'_>) -> Result<String, PrepError>;
}
