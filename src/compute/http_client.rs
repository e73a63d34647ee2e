//! # HTTP Compute Client
//!
//! ComfyUI-compatible binding of [`ComputeService`]:
//!
//! - `POST {base_url}/prompt` with `{"prompt": <workflow>, "client_id": <uuid>}`
//!   answers `{"prompt_id": "<id>"}`
//! - `GET {base_url}/history/{id}` answers `{}` while queued or running, then
//!   `{"<id>": {"status": {...}, "outputs": {"<node>": {"images": [...]}}}}`
//!
//! Server errors (5xx) are retried inside the call with exponential backoff up
//! to `max_retries`, then reported as `Connection`. Transport failures and
//! timeouts are `Connection` immediately; the next loop tick is the retry.
//! Client errors (4xx) and unparsable bodies are `Protocol`.

use super::traits::{ComputeService, ExternalJobStatus, OutputEntry};
use crate::config::ComputeConfig;
use crate::error::{GentreeError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct HttpComputeClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpComputeClient {
    /// Build a client with the configured per-call timeout
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("gentree/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GentreeError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let client_id = Uuid::new_v4().to_string();
        info!(
            base_url = %config.base_url,
            timeout_ms = config.request_timeout_ms,
            max_retries = config.max_retries,
            client_id = %client_id,
            "Compute client created"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id,
            max_retries: config.max_retries,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    /// Override the first backoff delay (doubles per retry)
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_with_retry<F>(&self, operation: &str, build_request: F) -> Result<Value>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries: u32 = 0;
        loop {
            match build_request().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.text().await.map_err(|e| {
                            GentreeError::connection(format!("{operation}: failed to read response body: {e}"))
                        })?;
                        return serde_json::from_str(&body).map_err(|e| {
                            error!(operation, error = %e, "Unparsable compute service response");
                            GentreeError::protocol(format!("{operation}: invalid JSON response: {e}"))
                        });
                    }

                    let error_text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());

                    // Don't retry anything but server errors
                    if !status.is_server_error() {
                        error!(operation, status = %status, error = %error_text, "Compute service rejected request");
                        return Err(GentreeError::protocol(format!(
                            "{operation}: HTTP {status}: {error_text}"
                        )));
                    }

                    if retries >= self.max_retries {
                        error!(
                            operation,
                            status = %status,
                            retries,
                            "Exhausted all retries against compute service"
                        );
                        return Err(GentreeError::connection(format!(
                            "{operation}: HTTP {status} after {retries} retries: {error_text}"
                        )));
                    }

                    warn!(
                        operation,
                        status = %status,
                        error = %error_text,
                        retry = retries + 1,
                        max_retries = self.max_retries,
                        "Server error from compute service, will retry"
                    );
                }
                Err(e) => {
                    warn!(operation, error = %e, "Compute service unreachable");
                    return Err(GentreeError::connection(format!("{operation}: {e}")));
                }
            }

            retries += 1;
            let delay = self.retry_base_delay * 2u32.saturating_pow(retries - 1);
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ComputeService for HttpComputeClient {
    async fn submit(&self, workflow: &Value) -> Result<String> {
        let url = format!("{}/prompt", self.base_url);
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        debug!(url = %url, "Submitting workflow to compute service");
        let response = self
            .send_with_retry("submit", || self.client.post(&url).json(&body))
            .await?;

        parse_submit_response(&response)
    }

    async fn get_status(&self, external_job_id: &str) -> Result<ExternalJobStatus> {
        let url = format!("{}/history/{}", self.base_url, external_job_id);
        let response = self
            .send_with_retry("get_status", || self.client.get(&url))
            .await?;

        parse_history(external_job_id, &response)
    }
}

/// Extract `prompt_id` from a submit response
pub fn parse_submit_response(body: &Value) -> Result<String> {
    match body.get("prompt_id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(GentreeError::protocol(format!(
            "submit response has no prompt_id: {body}"
        ))),
    }
}

/// Map a `/history/{id}` body onto [`ExternalJobStatus`]
pub fn parse_history(external_job_id: &str, body: &Value) -> Result<ExternalJobStatus> {
    let history = body.as_object().ok_or_else(|| {
        GentreeError::protocol(format!("history response is not an object: {body}"))
    })?;

    // Absent until the job leaves the queue
    let Some(entry) = history.get(external_job_id) else {
        return Ok(ExternalJobStatus::Running);
    };

    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str);
    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if status_str == Some("error") {
        return Ok(ExternalJobStatus::Failed {
            error: execution_error_message(status),
        });
    }

    if !completed && status_str != Some("success") {
        return Ok(ExternalJobStatus::Running);
    }

    let mut outputs = Vec::new();
    if let Some(nodes) = entry.get("outputs").and_then(Value::as_object) {
        for node in nodes.values() {
            let Some(images) = node.get("images").and_then(Value::as_array) else {
                continue;
            };
            for image in images {
                let output: OutputEntry = serde_json::from_value(image.clone()).map_err(|e| {
                    GentreeError::protocol(format!("malformed output entry {image}: {e}"))
                })?;
                outputs.push(output);
            }
        }
    }

    if outputs.is_empty() {
        return Err(GentreeError::protocol(format!(
            "job {external_job_id} completed without any output entries"
        )));
    }

    Ok(ExternalJobStatus::Completed { outputs })
}

/// Best human-readable message from `status.messages`
fn execution_error_message(status: Option<&Value>) -> String {
    let messages = status
        .and_then(|s| s.get("messages"))
        .and_then(Value::as_array);

    messages
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|msg| msg.first().and_then(Value::as_str) == Some("execution_error"))
        .and_then(|msg| msg.get(1))
        .and_then(|detail| {
            let text = detail.get("exception_message").and_then(Value::as_str)?;
            let node = detail.get("node_type").and_then(Value::as_str);
            Some(match node {
                Some(node) => format!("{node}: {}", text.trim()),
                None => text.trim().to_string(),
            })
        })
        .unwrap_or_else(|| "compute service reported an execution error".to_string())
}
