//! Common error type and alias.
//!
//! `AppError` doubles as the HTTP error response: client mistakes map to
//! 4xx with a descriptive body, everything else collapses to a generic 500.
use std::time::Duration;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid size '{requested}'")]
    InvalidSize { requested: String, allowed: Vec<u32> },

    #[error("missing upload field '{0}'")]
    MissingField(&'static str),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Non-2xx reply or a reply missing the expected field.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to read workflow {path}: {source}")]
    WorkflowIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow {path}: {source}")]
    WorkflowParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("workflow {0} is not a mapping of nodes")]
    WorkflowShape(String),

    #[error("workflow has no node '{0}'")]
    MissingNode(String),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("run {0} is no longer reported by the backend")]
    RunAbsent(String),

    #[error("run {run_id} produced no output after {waited:?}")]
    Timeout { run_id: String, waited: Duration },

    #[error("resized image would be {width}x{height}, over the {max_pixels} pixel limit")]
    OutputTooLarge { width: u32, height: u32, max_pixels: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidSize { .. } => StatusCode::BAD_REQUEST,
            AppError::MissingField(_) | AppError::Multipart(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::InvalidSize { allowed, .. } => {
                format!("Invalid size. Allowed sizes are {:?}", allowed)
            }
            AppError::MissingField(field) => format!("Missing upload field '{}'", field),
            AppError::Multipart(e) => format!("Malformed upload: {}", e),
            other => {
                tracing::error!(error = %other, "request failed");
                "Failed to process images".to_string()
            }
        };
        if status.is_client_error() {
            tracing::warn!(%status, "{}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
