use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Missing file in request: {0}")]
    MissingFile(&'static str),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Program generation failed: {0}")]
    Generation(String),

    #[error("Program execution failed: {0}")]
    Execution(String),

    #[error("Time budget exhausted")]
    DeadlineExceeded,

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrepError {
    /// Stable machine-readable code returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            PrepError::MissingFile(_) => "MISSING_FILE",
            PrepError::Decode(_) => "DECODE_ERROR",
            PrepError::UnknownCategory(_) => "UNKNOWN_CATEGORY",
            PrepError::Generation(_) => "GENERATION_ERROR",
            PrepError::Execution(_) => "EXECUTION_ERROR",
            PrepError::DeadlineExceeded => "TIME_BUDGET_EXCEEDED",
            PrepError::Upstream(_) => "UPSTREAM_ERROR",
            PrepError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            PrepError::InvalidRequest(_) => "INVALID_REQUEST",
            PrepError::Encode(_) => "ENCODE_ERROR",
            PrepError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PrepError::MissingFile(_)
            | PrepError::Decode(_)
            | PrepError::UnknownCategory(_)
            | PrepError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PrepError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PrepError::Generation(_)
            | PrepError::Execution(_)
            | PrepError::DeadlineExceeded => StatusCode::UNPROCESSABLE_ENTITY,
            PrepError::Upstream(_) => StatusCode::BAD_GATEWAY,
            PrepError::Encode(_) | PrepError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for PrepError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
