//! Inpaint relay library
//!
//! Modules:
//! - `api`: Axum HTTP handlers and router setup used by the binary.
//! - `comfyui`: Thin client for the backend REST endpoints plus the run poller.
//! - `workflow`: Loading workflow graphs and filling their image slots.
//! - `imaging`: Decode, aspect-preserving resize and PNG encode.
//! - `pipeline`: The upload → execute → poll → resize composite.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `ComfyUIClient`,
//! `ResultPoller` and `Workflow`.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod workflow;

pub use comfyui::client::ComfyUIClient;
pub use comfyui::poller::ResultPoller;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use workflow::Workflow;
