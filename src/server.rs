use crate::comparison::ComparisonResult;
use crate::config::Config;
use crate::engine::PrepEngine;
use crate::error::PrepError;
use crate::preprocessing::{params, Category, PipelineParameters, PreprocessingResult};
use crate::vision::openai::OpenAiService;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderName},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and option fields on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Fields always treated as uploaded files, even without a filename
const FILE_FIELDS: [&str; 3] = ["file", "original_image", "preprocessed_image"];

const SUPPORTED_FORMATS: [&str; 6] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PrepEngine>,
    pub config: Arc<Config>,
}

/// Text extraction response
#[derive(Serialize)]
pub struct ExtractTextResponse {
    pub extracted_text: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub categories: Vec<String>,
    pub custom_options: Vec<String>,
    pub supported_formats: Vec<String>,
    pub max_file_size_bytes: usize,
    pub service: String,
    pub model: String,
    pub program_max_steps: usize,
    pub program_time_budget_ms: u64,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let service = OpenAiService::new(&config.vision);
    let engine = PrepEngine::new(Arc::new(service), config.program);
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/preprocess", post(handle_preprocess))
        .route("/category_preprocess/:category", post(handle_category_preprocess))
        .route("/custom_preprocess", post(handle_custom_preprocess))
        .route("/extract_text", post(handle_extract_text))
        .route("/extract_text_preprocessed", post(handle_compare))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parsed multipart form: uploaded files plus plain text fields
struct Upload {
    files: HashMap<String, Bytes>,
    fields: Vec<(String, String)>,
}

impl Upload {
    async fn read(mut multipart: Multipart, max_file_size: usize) -> Result<Self, PrepError> {
        let mut files = HashMap::new();
        let mut fields = Vec::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| PrepError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if field.file_name().is_some() || FILE_FIELDS.contains(&name.as_str()) {
                let data = field.bytes().await.map_err(|e| {
                    PrepError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?;
                if data.len() > max_file_size {
                    return Err(PrepError::ImageTooLarge {
                        size: data.len(),
                        max: max_file_size,
                    });
                }
                files.insert(name, data);
            } else {
                // Invalid UTF-8 decodes lossily and coerces to the default
                let data = field.bytes().await.map_err(|e| {
                    PrepError::InvalidRequest(format!("Invalid field {}: {}", name, e))
                })?;
                fields.push((name, String::from_utf8_lossy(&data).into_owned()));
            }
        }

        Ok(Self { files, fields })
    }

    fn take_file(&mut self, name: &'static str) -> Result<Bytes, PrepError> {
        self.files
            .remove(name)
            .filter(|data| !data.is_empty())
            .ok_or(PrepError::MissingFile(name))
    }
}

/// Processed PNG plus its provenance headers
struct ImageReply {
    png: Vec<u8>,
    pipeline: String,
    steps: String,
    total_time_ms: u64,
}

impl ImageReply {
    fn render(result: PreprocessingResult) -> Result<Self, PrepError> {
        let png = crate::preprocessing::encode_png(&result.image)?;
        Ok(Self {
            png,
            steps: result.step_names().join(","),
            pipeline: result.pipeline,
            total_time_ms: result.total_time_ms,
        })
    }
}

impl IntoResponse for ImageReply {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"processed_image.png\"".to_string(),
                ),
                (HeaderName::from_static("x-preprocess-pipeline"), self.pipeline),
                (HeaderName::from_static("x-preprocess-steps"), self.steps),
                (
                    HeaderName::from_static("x-processing-time-ms"),
                    self.total_time_ms.to_string(),
                ),
            ],
            self.png,
        )
            .into_response()
    }
}

/// Run CPU-bound or blocking work off the async workers
async fn run_blocking<T, F>(work: F) -> Result<T, PrepError>
where
    F: FnOnce() -> Result<T, PrepError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PrepError::Internal(format!("Worker task failed: {}", e)))?
}

/// Handle default preprocessing requests
async fn handle_preprocess(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ImageReply, PrepError> {
    let mut upload = Upload::read(multipart, state.config.max_file_size).await?;
    let data = upload.take_file("file")?;

    let engine = state.engine.clone();
    run_blocking(move || engine.preprocess_default(&data).and_then(ImageReply::render)).await
}

/// Handle category preprocessing requests
async fn handle_category_preprocess(
    State(state): State<AppState>,
    Path(category): Path<String>,
    multipart: Multipart,
) -> Result<ImageReply, PrepError> {
    let mut upload = Upload::read(multipart, state.config.max_file_size).await?;
    let data = upload.take_file("file")?;

    // The sandbox stops itself at this deadline; the timeout below bounds
    // the whole request, service call included.
    let generated = matches!(category.parse::<Category>(), Ok(Category::AiGenerated));
    let allowance = state.engine.limits().time_budget + state.config.vision.request_timeout;
    let deadline = generated
        .then(|| Instant::now().checked_add(allowance))
        .flatten();

    let engine = state.engine.clone();
    let work = run_blocking(move || {
        engine
            .preprocess_category(&data, &category, deadline)
            .and_then(ImageReply::render)
    });

    let Some(deadline) = deadline else {
        return work.await;
    };

    match tokio::time::timeout_at(deadline.into(), work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Generated program timed out after {:?}", allowance);
            Err(PrepError::Execution(format!(
                "generated program timed out after {}ms",
                allowance.as_millis()
            )))
        }
    }
}

/// Handle parameterized preprocessing requests
async fn handle_custom_preprocess(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ImageReply, PrepError> {
    let mut upload = Upload::read(multipart, state.config.max_file_size).await?;
    let data = upload.take_file("file")?;
    let parameters: PipelineParameters = upload.fields.into_iter().collect();

    let engine = state.engine.clone();
    run_blocking(move || {
        engine
            .preprocess_custom(&data, &parameters)
            .and_then(ImageReply::render)
    })
    .await
}

/// Handle single-image text extraction requests
async fn handle_extract_text(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractTextResponse>, PrepError> {
    let mut upload = Upload::read(multipart, state.config.max_file_size).await?;
    let data = upload.take_file("file")?;

    let engine = state.engine.clone();
    let extracted_text = run_blocking(move || engine.extract_text(&data)).await?;

    tracing::info!("Extracted {} characters", extracted_text.chars().count());

    Ok(Json(ExtractTextResponse { extracted_text }))
}

/// Handle baseline versus preprocessed comparison requests
async fn handle_compare(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ComparisonResult>, PrepError> {
    let mut upload = Upload::read(multipart, state.config.max_file_size).await?;
    let original = upload.take_file("original_image")?;
    let preprocessed = upload.take_file("preprocessed_image")?;

    let engine = state.engine.clone();
    let result = run_blocking(move || engine.compare(&original, &preprocessed)).await?;

    Ok(Json(result))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let limits = state.engine.limits();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        categories: Category::ALL.iter().map(|c| c.as_str().to_string()).collect(),
        custom_options: params::OPTION_NAMES.iter().map(|s| s.to_string()).collect(),
        supported_formats: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
        max_file_size_bytes: state.config.max_file_size,
        service: state.engine.service().name().to_string(),
        model: state.engine.service().model().to_string(),
        program_max_steps: limits.max_steps,
        program_time_budget_ms: limits.time_budget.as_millis() as u64,
    })
}
