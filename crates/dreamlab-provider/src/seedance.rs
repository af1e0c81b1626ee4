//! Seedance (Volcengine) API client.
//!
//! Bearer-key auth, no request signing. Reference material is passed
//! through the multimodal prompt using the platform's @-reference
//! syntax, with the structured lists alongside.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use dreamlab_models::{PendingSubmission, Provider, ProviderLimits};

use crate::error::{ProviderError, ProviderResult};
use crate::retry::with_network_retry;
use crate::types::TaskStatus;

/// Seedance client configuration.
#[derive(Debug, Clone)]
pub struct SeedanceConfig {
    pub base_url: String,
    pub api_key: String,
}

impl SeedanceConfig {
    /// Read config from environment. Returns `None` when no API key is
    /// set; the router treats that as "provider not configured".
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SEEDANCE_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Self {
            base_url: std::env::var("SEEDANCE_BASE_URL")
                .unwrap_or_else(|_| "https://visual.volcengineapi.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }
}

/// Seedance API client.
#[derive(Clone)]
pub struct SeedanceClient {
    http: Client,
    config: SeedanceConfig,
}

impl SeedanceClient {
    pub fn new(config: SeedanceConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("dreamlab-provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { http, config })
    }

    /// Submit a generation request; returns the provider task id.
    pub async fn submit(
        &self,
        submission: &PendingSubmission,
        limits: &ProviderLimits,
    ) -> ProviderResult<String> {
        let body = build_submit_body(submission, limits);

        let response: Value = with_network_retry("seedance_submit", || async {
            let resp = self
                .http
                .post(format!("{}/v1/videos/seedance", self.config.base_url))
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;
            Ok(resp.json::<Value>().await?)
        })
        .await?;

        let task_id = response
            .pointer("/data/task_id")
            .or_else(|| response.get("task_id"))
            .and_then(Value::as_str);

        match task_id {
            Some(id) => {
                info!(task_id = %id, "seedance task submitted");
                Ok(id.to_string())
            }
            None => {
                let message = response
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("No task_id returned")
                    .to_string();
                warn!(message = %message, "seedance returned no task id");
                Err(ProviderError::Rejected {
                    provider: Provider::Seedance,
                    code: response.get("code").and_then(Value::as_i64).unwrap_or(-1),
                    message,
                })
            }
        }
    }

    /// Poll a task's authoritative status.
    pub async fn poll(&self, task_id: &str) -> ProviderResult<TaskStatus> {
        let response: Value = with_network_retry("seedance_poll", || async {
            let resp = self
                .http
                .get(format!(
                    "{}/v1/videos/seedance/{}",
                    self.config.base_url, task_id
                ))
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;
            Ok(resp.json::<Value>().await?)
        })
        .await?;

        debug!(task_id = %task_id, "seedance poll response received");
        parse_task_status(&response)
    }
}

/// Build the Seedance generation body. Prompts carry @-references to
/// the attached material, mirroring the platform's web product.
pub fn build_submit_body(submission: &PendingSubmission, limits: &ProviderLimits) -> Value {
    let duration = submission.total_duration_s().min(limits.max_duration_s);

    // Seedance has no multi-shot mode; shot prompts collapse into one.
    let prompt = match submission {
        PendingSubmission::SingleShot { prompt, .. } => prompt.clone(),
        PendingSubmission::MultiShot { shots, .. } => shots
            .iter()
            .map(|s| s.prompt.as_str())
            .collect::<Vec<_>>()
            .join(". "),
    };

    let mut image_list = Vec::new();
    let mut material_refs = Vec::new();
    if let Some(image) = submission.image_url() {
        image_list.push(json!({ "url": image, "role": "first_frame" }));
        material_refs.push(format!("@图片{} 为首帧", image_list.len()));
    }

    let full_prompt = if material_refs.is_empty() {
        prompt
    } else {
        format!("{}。{}", material_refs.join("，"), prompt)
    };

    let mut body = json!({
        "model": "seedance-2.0",
        "prompt": full_prompt,
        "duration": format!("{}", duration),
        "aspect_ratio": submission.aspect_ratio(),
        "generate_audio": true,
    });

    if !image_list.is_empty() {
        body["image_list"] = json!(image_list);
    }
    if let Some(callback) = submission.callback_url() {
        body["callback_url"] = json!(callback);
    }

    body
}

/// Parse a poll response into a normalized [`TaskStatus`].
pub fn parse_task_status(response: &Value) -> ProviderResult<TaskStatus> {
    match response.pointer("/data/task_status").and_then(Value::as_str) {
        Some("succeed") => {
            let video_url = response
                .pointer("/data/task_result/videos/0/url")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ProviderError::transient("succeeded task carried no video url")
                })?;
            Ok(TaskStatus::Succeeded {
                video_url: video_url.to_string(),
            })
        }
        Some("failed") => Ok(TaskStatus::Failed {
            reason: response
                .pointer("/data/task_status_msg")
                .and_then(Value::as_str)
                .unwrap_or("Generation failed")
                .to_string(),
        }),
        Some(_) | None => Ok(TaskStatus::Processing),
    }
}
