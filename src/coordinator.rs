use crate::config::CoordinatorConfig;
use crate::error::{DroverError, Result};
use crate::pipeline::item::{CoordinatorHealth, ExecutionResult, ResultUpload, SubmitAck, WorkItem};

/// Largest batch the coordinator will serve per fetch.
const MAX_BATCH_SIZE: usize = 50;

/// HTTP client for the coordinator's pull API.
///
/// Fetches and submissions are retried up to `max_retries` with a fixed
/// delay in between; a non-success status, a transport error and an
/// undecodable body all count as a failed attempt.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
    config: CoordinatorConfig,
}

impl CoordinatorClient {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let base_url = config.url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Ask the coordinator to lease a batch of commands. Returns `None` once
    /// every attempt has failed; an empty batch means no work is available.
    pub async fn fetch_batch(&self, batch_size: usize) -> Option<Vec<WorkItem>> {
        let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        for attempt in 1..=self.config.max_retries {
            match self.try_fetch(batch_size).await {
                Ok(items) => return Some(items),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Failed to fetch commands");
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
        None
    }

    async fn try_fetch(&self, batch_size: usize) -> Result<Vec<WorkItem>> {
        let response = self
            .http
            .get(format!("{}/get_commands", self.base_url))
            .query(&[("batch_size", batch_size)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DroverError::CoordinatorStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Deliver finished results. An empty slice is trivially accepted
    /// without touching the network. On exhaustion the last error is
    /// returned so the caller can decide the batch's fate.
    pub async fn submit_results(&self, results: &[ExecutionResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        let uploads: Vec<ResultUpload> = results
            .iter()
            .map(|r| ResultUpload::from_result(r, &self.config.description))
            .collect();

        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            match self.try_submit(&uploads).await {
                Ok(ack) => {
                    tracing::info!(count = ack.count, "Results accepted by coordinator");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Failed to submit results");
                    last_error = Some(e);
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DroverError::CoordinatorStatus(reqwest::StatusCode::INTERNAL_SERVER_ERROR)
        }))
    }

    async fn try_submit(&self, uploads: &[ResultUpload]) -> Result<SubmitAck> {
        let response = self
            .http
            .post(format!("{}/submit_results", self.base_url))
            .json(uploads)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DroverError::CoordinatorStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    /// One-shot health probe, no retries.
    pub async fn health(&self) -> Result<CoordinatorHealth> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DroverError::CoordinatorStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}
