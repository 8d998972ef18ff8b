//! Shared state and router construction.
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::comfyui::client::ComfyUIClient;
use crate::config::Config;
use crate::error::AppResult;

pub struct AppState {
    pub config: Config,
    pub comfyui_client: ComfyUIClient,
}

impl AppState {
    pub fn new(config: Config) -> AppResult<Self> {
        let comfyui_client = ComfyUIClient::with_timeout(config.comfyui_url.clone(), config.request_timeout)?;
        Ok(AppState { config, comfyui_client })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::root))
        .route("/process_images", post(handlers::process_images))
        .route("/process_images/", post(handlers::process_images))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
