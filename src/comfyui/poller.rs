//! Waits for a submitted run to produce an output image.
//!
//! Each poll reads the backend's global status map and resolves the run into
//! a [`RunStatus`], which drives a three-state machine:
//!
//! - `Polling` while the run is present but not finished (or finished
//!   without outputs yet),
//! - `Completed` once the run reports `"completed"` with at least one asset,
//! - `Absent` as soon as the run id is missing from the status map.
//!
//! Polls are spaced with capped exponential backoff and bounded by both an
//! attempt count and an overall deadline.
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::comfyui::client::ComfyUIClient;
use crate::error::{AppError, AppResult};

const COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl PollPolicy {
    /// Delay after the `attempt`-th poll (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.interval
            .checked_mul(factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

#[derive(Debug, Deserialize)]
struct RunEntry {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output_images: Vec<String>,
}

/// What the status map says about one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Absent,
    Running(String),
    Completed(Vec<String>),
}

impl RunStatus {
    pub fn from_status(status: &Value, run_id: &str) -> AppResult<Self> {
        let Some(entry) = status.get(run_id) else {
            return Ok(RunStatus::Absent);
        };
        let entry: RunEntry = serde_json::from_value(entry.clone()).map_err(|e| {
            AppError::Backend(format!("malformed status entry for run {}: {}", run_id, e))
        })?;
        if entry.status == COMPLETED {
            Ok(RunStatus::Completed(entry.output_images))
        } else {
            Ok(RunStatus::Running(entry.status))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Completed(String),
    Absent,
}

impl PollState {
    pub fn next(status: RunStatus) -> Self {
        match status {
            RunStatus::Absent => PollState::Absent,
            RunStatus::Completed(outputs) => match outputs.into_iter().next() {
                Some(first) => PollState::Completed(first),
                None => PollState::Polling,
            },
            RunStatus::Running(_) => PollState::Polling,
        }
    }
}

pub struct ResultPoller<'a> {
    client: &'a ComfyUIClient,
    policy: &'a PollPolicy,
}

impl<'a> ResultPoller<'a> {
    pub fn new(client: &'a ComfyUIClient, policy: &'a PollPolicy) -> Self {
        ResultPoller { client, policy }
    }

    /// Poll until the run yields an output asset and return its name.
    pub async fn wait_for_output(&self, run_id: &str) -> AppResult<String> {
        let started = Instant::now();
        match tokio::time::timeout(self.policy.deadline, self.poll_loop(run_id, started)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(run_id, "Polling deadline of {:?} elapsed", self.policy.deadline);
                Err(AppError::Timeout { run_id: run_id.to_string(), waited: started.elapsed() })
            }
        }
    }

    /// Poll until completion, then download the first output asset.
    pub async fn fetch_output(&self, run_id: &str) -> AppResult<Vec<u8>> {
        let filename = self.wait_for_output(run_id).await?;
        tracing::info!(run_id, filename = %filename, "Fetching output image");
        self.client.get_image(&filename).await
    }

    async fn poll_loop(&self, run_id: &str, started: Instant) -> AppResult<String> {
        let mut state = PollState::Polling;
        let mut attempt = 0;
        while state == PollState::Polling {
            if attempt >= self.policy.max_attempts {
                tracing::warn!(run_id, attempts = attempt, "Run still pending, giving up");
                return Err(AppError::Timeout { run_id: run_id.to_string(), waited: started.elapsed() });
            }
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
            }
            let status = self.client.get_status().await?;
            let run_status = RunStatus::from_status(&status, run_id)?;
            tracing::debug!(run_id, attempt, ?run_status, "Polled run status");
            state = PollState::next(run_status);
            attempt += 1;
        }

        match state {
            PollState::Completed(filename) => Ok(filename),
            _ => {
                tracing::error!(run_id, "Run disappeared from backend status");
                Err(AppError::RunAbsent(run_id.to_string()))
            }
        }
    }
}
