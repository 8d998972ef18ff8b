//! Axum request handlers for the HTTP API.
use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::routes::AppState;
use crate::error::{AppError, AppResult};
use crate::pipeline;

pub async fn root() -> &'static str {
    "Inpaint Relay"
}

/// `POST /process_images/?size=N` with multipart `original` and `replacement`.
pub async fn process_images(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("process_images", %request_id, size = tracing::field::Empty);

    async move {
        // Rejected sizes never reach the backend.
        let size = state.config.resolve_size(params.get("size").map(String::as_str))?;
        tracing::Span::current().record("size", size);

        let (original, replacement) = read_uploads(multipart).await?;
        tracing::info!(
            original_bytes = original.len(),
            replacement_bytes = replacement.len(),
            "Received uploads"
        );

        let resized = pipeline::composite(&state.comfyui_client, &state.config, original, replacement, size).await?;
        Ok::<_, AppError>(Json(json!({ "image": STANDARD.encode(resized), "size": size })))
    }
    .instrument(span)
    .await
}

async fn read_uploads(mut multipart: Multipart) -> AppResult<(Vec<u8>, Vec<u8>)> {
    let mut original = None;
    let mut replacement = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("original") => original = Some(field.bytes().await?.to_vec()),
            Some("replacement") => replacement = Some(field.bytes().await?.to_vec()),
            other => tracing::debug!(field = ?other, "Ignoring multipart field"),
        }
    }
    let original = original.ok_or(AppError::MissingField("original"))?;
    let replacement = replacement.ok_or(AppError::MissingField("replacement"))?;
    Ok((original, replacement))
}
