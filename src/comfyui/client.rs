//! Thin HTTP client for the generative backend.
//!
//! - `upload_image` posts a base64 PNG to `/upload/image`.
//! - `submit_workflow` posts the graph to `/execute` and returns the run id.
//! - `get_status` fetches `/status` as JSON.
//! - `get_image` proxies to `/view?filename=...` and returns raw bytes.
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::imaging;
use crate::workflow::Workflow;

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
}

impl ComfyUIClient {
    pub fn new(base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient { client: Client::new(), base_url: base }
    }

    /// Same as `new`, but every request gives up after `timeout`.
    pub fn with_timeout(base_url: String, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::HttpClient)?;
        let base = base_url.trim_end_matches('/').to_string();
        Ok(ComfyUIClient { client, base_url: base })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload an image for the given slot node and return the asset name the
    /// backend assigned to it.
    pub async fn upload_image(&self, image: &DynamicImage, node_id: u32) -> AppResult<String> {
        let png = imaging::encode_png(image)?;
        let url = format!("{}/upload/image", self.base_url);
        tracing::info!(node_id, bytes = png.len(), "Uploading image to {}", url);

        let response = self.client.post(&url)
            .json(&json!({ "image": STANDARD.encode(&png), "node_id": node_id }))
            .send()
            .await
            .map_err(AppError::HttpClient)?;
        let body = Self::json_or_error(response, "upload image").await?;

        let name = required_str(&body, "name", "upload")?;
        tracing::debug!(node_id, name = %name, "Upload accepted");
        Ok(name)
    }

    /// Submit a workflow for execution and return its run id.
    pub async fn submit_workflow(&self, workflow: &Workflow) -> AppResult<String> {
        let url = format!("{}/execute", self.base_url);
        tracing::info!("Submitting workflow to {}", url);
        tracing::debug!("Workflow payload: {:?}", workflow.document());

        let response = self.client.post(&url)
            .json(&json!({ "workflow": workflow.document() }))
            .send()
            .await
            .map_err(AppError::HttpClient)?;
        let body = Self::json_or_error(response, "submit workflow").await?;

        let run_id = required_str(&body, "run_id", "execute")?;
        tracing::info!(run_id = %run_id, "Workflow queued");
        Ok(run_id)
    }

    /// Fetch the backend's status map, keyed by run id.
    pub async fn get_status(&self) -> AppResult<Value> {
        let url = format!("{}/status", self.base_url);
        let response = self.client.get(&url)
            .send()
            .await
            .map_err(AppError::HttpClient)?;
        Self::json_or_error(response, "get status").await
    }

    /// Fetch image bytes by filename via the `/view` endpoint.
    pub async fn get_image(&self, filename: &str) -> AppResult<Vec<u8>> {
        let url = format!("{}/view", self.base_url);
        let response = self.client.get(&url)
            .query(&[("filename", filename)])
            .send()
            .await
            .map_err(AppError::HttpClient)?;

        if response.status().is_success() {
            response.bytes().await.map(|b| b.to_vec()).map_err(AppError::HttpClient)
        } else {
            Err(AppError::Backend(format!("Failed to get image {}: {:?}", filename, response.status())))
        }
    }

    async fn json_or_error(response: Response, action: &str) -> AppResult<Value> {
        if response.status().is_success() {
            response.json().await.map_err(AppError::HttpClient)
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
            let error_message = format!("Failed to {}. Status: {}, Body: {}", action, status, error_body);
            tracing::error!("{}", error_message);
            Err(AppError::Backend(error_message))
        }
    }
}

fn required_str(body: &Value, field: &str, endpoint: &str) -> AppResult<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Backend(format!("{} response has no '{}' field: {}", endpoint, field, body)))
}
