//! Env-driven configuration for the service and library.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults are provided for convenience during development.
//! The resulting `Config` is built once at start-up and handed to the
//! components by reference.
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::comfyui::poller::PollPolicy;
use crate::error::{AppError, AppResult};

pub const DEFAULT_ALLOWED_SIZES: [u32; 6] = [460, 500, 600, 640, 720, 1000];

/// Node ids whose `inputs.image` receive the uploaded asset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSlots {
    pub original: u32,
    pub replacement: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub comfyui_url: String,
    pub workflow_path: PathBuf,
    pub api_host: String,
    pub api_port: String,
    pub allowed_sizes: Vec<u32>,
    pub default_size: u32,
    pub slots: ImageSlots,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub max_output_pixels: u64,
}

const VARS: &[&str] = &[
    "COMFYUI_URL",
    "WORKFLOW_PATH",
    "API_HOST",
    "API_PORT",
    "ALLOWED_SIZES",
    "DEFAULT_SIZE",
    "ORIGINAL_NODE_ID",
    "REPLACEMENT_NODE_ID",
    "POLL_INTERVAL_MS",
    "POLL_MAX_INTERVAL_MS",
    "POLL_MAX_ATTEMPTS",
    "POLL_TIMEOUT_SECS",
    "REQUEST_TIMEOUT_SECS",
    "MAX_UPLOAD_BYTES",
    "MAX_OUTPUT_PIXELS",
];

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let allowed_sizes = match get("ALLOWED_SIZES") {
            Some(raw) => parse_sizes(&raw)?,
            None => DEFAULT_ALLOWED_SIZES.to_vec(),
        };
        let default_size = parse_or("DEFAULT_SIZE", get("DEFAULT_SIZE"), 640u32)?;
        if !allowed_sizes.contains(&default_size) {
            return Err(AppError::Config(format!(
                "DEFAULT_SIZE {} is not one of {:?}",
                default_size, allowed_sizes
            )));
        }

        let poll = PollPolicy {
            interval: Duration::from_millis(parse_or("POLL_INTERVAL_MS", get("POLL_INTERVAL_MS"), 500)?),
            max_interval: Duration::from_millis(parse_or(
                "POLL_MAX_INTERVAL_MS",
                get("POLL_MAX_INTERVAL_MS"),
                5_000,
            )?),
            max_attempts: parse_or("POLL_MAX_ATTEMPTS", get("POLL_MAX_ATTEMPTS"), 120)?,
            deadline: Duration::from_secs(parse_or("POLL_TIMEOUT_SECS", get("POLL_TIMEOUT_SECS"), 300)?),
        };
        if poll.max_attempts == 0 {
            return Err(AppError::Config("POLL_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        let max_output_pixels: u64 = parse_or("MAX_OUTPUT_PIXELS", get("MAX_OUTPUT_PIXELS"), 40_000_000)?;
        if max_output_pixels == 0 {
            return Err(AppError::Config("MAX_OUTPUT_PIXELS must be at least 1".to_string()));
        }

        Ok(Config {
            comfyui_url: get("COMFYUI_URL")
                .unwrap_or_else(|| "http://localhost:8188".to_string())
                .trim_end_matches('/')
                .to_string(),
            workflow_path: get("WORKFLOW_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("workflow/inpaint_workflow.json")),
            api_host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: get("API_PORT").unwrap_or_else(|| "8000".to_string()),
            allowed_sizes,
            default_size,
            slots: ImageSlots {
                original: parse_or("ORIGINAL_NODE_ID", get("ORIGINAL_NODE_ID"), 140)?,
                replacement: parse_or("REPLACEMENT_NODE_ID", get("REPLACEMENT_NODE_ID"), 218)?,
            },
            poll,
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                60,
            )?),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), 32 * 1024 * 1024)?,
            max_output_pixels,
        })
    }

    /// Check a requested output width against the allow-list.
    pub fn validate_size(&self, size: u32) -> AppResult<u32> {
        if self.allowed_sizes.contains(&size) {
            Ok(size)
        } else {
            Err(self.invalid_size(size.to_string()))
        }
    }

    /// Resolve the raw `size` query value: absent means the default.
    pub fn resolve_size(&self, raw: Option<&str>) -> AppResult<u32> {
        match raw {
            None => Ok(self.default_size),
            Some(s) => {
                let size = s.trim().parse::<u32>().map_err(|_| self.invalid_size(s.to_string()))?;
                self.validate_size(size)
            }
        }
    }

    fn invalid_size(&self, requested: String) -> AppError {
        AppError::InvalidSize {
            requested,
            allowed: self.allowed_sizes.clone(),
        }
    }

    pub fn print_env_vars() {
        for key in VARS {
            tracing::info!("{}: {}", key, env::var(key).unwrap_or_else(|_| "<unset>".to_string()));
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> AppResult<T> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", key, v))),
    }
}

fn parse_sizes(raw: &str) -> AppResult<Vec<u32>> {
    let sizes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::Config(format!("ALLOWED_SIZES entry '{}' is not a width", s)))
        })
        .collect::<AppResult<Vec<u32>>>()?;
    if sizes.is_empty() {
        return Err(AppError::Config("ALLOWED_SIZES is empty".to_string()));
    }
    Ok(sizes)
}
