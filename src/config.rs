use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub vision: VisionConfig,
    pub program: ProgramLimits,
}

/// Settings for the hosted model service
#[derive(Clone)]
pub struct VisionConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

// The API key must never reach the logs.
impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Bounds applied to every generated transform program
#[derive(Debug, Clone, Copy)]
pub struct ProgramLimits {
    pub max_steps: usize,
    pub time_budget: Duration,
    /// Largest working image, in pixels, a step may produce
    pub max_pixels: u64,
}

impl Default for ProgramLimits {
    fn default() -> Self {
        Self {
            max_steps: 32,
            time_budget: Duration::from_millis(10_000),
            max_pixels: 50_000_000,
        }
    }
}
