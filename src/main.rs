use clap::Parser;
use docprep::config::{Config, ProgramLimits, VisionConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docprep-server")]
#[command(about = "Document image preprocessing server with OCR comparison feedback")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "DOCPREP_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DOCPREP_PORT", default_value = "5000")]
    pub port: u16,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "DOCPREP_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Base URL of the OpenAI-compatible model service
    #[arg(long, env = "DOCPREP_API_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub api_base_url: String,

    /// API key for the model service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for text extraction, program generation and feedback
    #[arg(long, env = "DOCPREP_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Completion token cap per model call
    #[arg(long, env = "DOCPREP_MAX_TOKENS", default_value = "500")]
    pub max_tokens: u32,

    /// Timeout for a single model service call, in seconds
    #[arg(long, env = "DOCPREP_REQUEST_TIMEOUT_SECS", default_value = "60")]
    pub request_timeout_secs: u64,

    /// Maximum number of steps a generated program may contain
    #[arg(long, env = "DOCPREP_PROGRAM_MAX_STEPS", default_value = "32")]
    pub program_max_steps: usize,

    /// Execution time budget for a generated program, in milliseconds
    #[arg(long, env = "DOCPREP_PROGRAM_TIME_BUDGET_MS", default_value = "10000")]
    pub program_time_budget_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            vision: VisionConfig {
                api_base_url: args.api_base_url,
                api_key: args.api_key.filter(|key| !key.trim().is_empty()),
                model: args.model,
                max_tokens: args.max_tokens,
                request_timeout: Duration::from_secs(args.request_timeout_secs),
            },
            program: ProgramLimits {
                max_steps: args.program_max_steps,
                time_budget: Duration::from_millis(args.program_time_budget_ms),
                ..ProgramLimits::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from(args);

    tracing::info!("Starting docprep-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);
    if config.vision.api_key.is_none() {
        tracing::warn!("No API key configured; text extraction and program generation will fail");
    }

    docprep::server::run(config).await
}
