//! Kling API client.
//!
//! Auth is a short-lived HS256 JWT minted per request from the account
//! access/secret key pair. Responses carry a business `code` even on
//! HTTP 200, so classification happens on the JSON body, not the HTTP
//! status.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use dreamlab_models::{PendingSubmission, Provider, ProviderLimits};

use crate::error::{ProviderError, ProviderResult};
use crate::retry::with_network_retry;
use crate::types::TaskStatus;

/// Business codes that mean the account is out of quota or credits.
/// Retrying cannot help; the provider gets blocked instead.
pub const KLING_QUOTA_CODES: [i64; 4] = [1600039, 1600040, 1600037, 1000002];

const TOKEN_TTL_SECS: u64 = 1800;
const TOKEN_NBF_SKEW_SECS: u64 = 5;

/// Kling client configuration.
#[derive(Debug, Clone)]
pub struct KlingConfig {
    pub base_url: String,
    pub access_key: String,
    pub secret_key: String,
}

impl KlingConfig {
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self {
            base_url: std::env::var("KLING_BASE_URL")
                .map_err(|_| ProviderError::config_error("KLING_BASE_URL not set"))?
                .trim_end_matches('/')
                .to_string(),
            access_key: std::env::var("KLING_ACCESS_KEY")
                .map_err(|_| ProviderError::config_error("KLING_ACCESS_KEY not set"))?,
            secret_key: std::env::var("KLING_SECRET_KEY")
                .map_err(|_| ProviderError::config_error("KLING_SECRET_KEY not set"))?,
        })
    }
}

#[derive(Serialize)]
struct TokenClaims {
    iss: String,
    exp: u64,
    nbf: u64,
}

/// Kling API client.
#[derive(Clone)]
pub struct KlingClient {
    http: Client,
    config: KlingConfig,
}

impl KlingClient {
    pub fn new(config: KlingConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("dreamlab-provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(KlingConfig::from_env()?)
    }

    fn sign_token(&self) -> ProviderResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ProviderError::transient(e.to_string()))?
            .as_secs();
        let claims = TokenClaims {
            iss: self.config.access_key.clone(),
            exp: now + TOKEN_TTL_SECS,
            nbf: now.saturating_sub(TOKEN_NBF_SKEW_SECS),
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret_key.as_bytes()),
        )?)
    }

    /// Submit a generation request; returns the provider task id.
    pub async fn submit(
        &self,
        submission: &PendingSubmission,
        limits: &ProviderLimits,
    ) -> ProviderResult<String> {
        let body = build_submit_body(submission, limits);

        let response: Value = with_network_retry("kling_submit", || async {
            let token = self.sign_token()?;
            let resp = self
                .http
                .post(format!("{}/v1/videos/image2video", self.config.base_url))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            Ok(resp.json::<Value>().await?)
        })
        .await?;

        classify_submit_response(&response)
    }

    /// Poll a task's authoritative status.
    pub async fn poll(&self, task_id: &str) -> ProviderResult<TaskStatus> {
        let response: Value = with_network_retry("kling_poll", || async {
            let token = self.sign_token()?;
            let resp = self
                .http
                .get(format!(
                    "{}/v1/videos/image2video/{}",
                    self.config.base_url, task_id
                ))
                .bearer_auth(token)
                .send()
                .await?;
            Ok(resp.json::<Value>().await?)
        })
        .await?;

        debug!(task_id = %task_id, "kling poll response received");
        parse_task_status(&response)
    }
}

/// Build the image2video request body.
///
/// Single-shot payloads use `shot_type: intelligence` (one combined
/// prompt, provider auto-cuts); multi-shot payloads use `customize`
/// with per-shot prompts. Duration is capped at the provider's
/// per-call ceiling.
pub fn build_submit_body(submission: &PendingSubmission, limits: &ProviderLimits) -> Value {
    let duration = submission.total_duration_s().min(limits.max_duration_s);

    let mut body = json!({
        "model_name": "kling-v3",
        "mode": "pro",
        "multi_shot": true,
        "duration": format!("{}", duration),
        "aspect_ratio": submission.aspect_ratio(),
        "sound": "on",
    });

    match submission {
        PendingSubmission::SingleShot { prompt, .. } => {
            body["shot_type"] = json!("intelligence");
            body["prompt"] = json!(prompt);
        }
        PendingSubmission::MultiShot { shots, .. } => {
            body["shot_type"] = json!("customize");
            body["multi_prompt"] = json!(shots
                .iter()
                .map(|s| {
                    json!({
                        "index": s.index,
                        "prompt": s.prompt,
                        "duration": format!("{}", s.duration_s),
                    })
                })
                .collect::<Vec<_>>());
        }
    }

    if let Some(image) = submission.image_url() {
        body["image"] = json!(image);
    }
    if let Some(callback) = submission.callback_url() {
        body["callback_url"] = json!(callback);
    }

    let (anchor, voice) = match submission {
        PendingSubmission::SingleShot {
            character_anchor,
            voice_anchor,
            ..
        }
        | PendingSubmission::MultiShot {
            character_anchor,
            voice_anchor,
            ..
        } => (character_anchor, voice_anchor),
    };

    if let Some(anchor) = anchor {
        let entry = match anchor {
            dreamlab_models::CharacterAnchor::Element { element_id } => {
                json!({ "element_id": element_id })
            }
            dreamlab_models::CharacterAnchor::Image { frontal_image_url } => {
                json!({ "frontal_image_url": frontal_image_url })
            }
        };
        body["element_list"] = json!([entry]);
    }
    if let Some(voice) = voice {
        body["voice_list"] = json!([{ "voice_id": voice.voice_id }]);
    }

    body
}

/// Classify a submit response into a task id or a typed failure.
pub fn classify_submit_response(response: &Value) -> ProviderResult<String> {
    let code = response.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = response
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown Kling API error")
        .to_string();

    if KLING_QUOTA_CODES.contains(&code) {
        return Err(ProviderError::QuotaExhausted {
            provider: Provider::Kling,
            code,
            message,
        });
    }
    if code != 0 {
        warn!(code, message = %message, "kling rejected submission");
        return Err(ProviderError::Rejected {
            provider: Provider::Kling,
            code,
            message,
        });
    }

    response
        .pointer("/data/task_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProviderError::NoTaskId {
            provider: Provider::Kling,
        })
}

/// Parse a poll response into a normalized [`TaskStatus`].
pub fn parse_task_status(response: &Value) -> ProviderResult<TaskStatus> {
    let code = response.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Kling API error")
            .to_string();
        return Err(ProviderError::Rejected {
            provider: Provider::Kling,
            code,
            message,
        });
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use dreamlab_models::ShotSpec;
    use serde_json::json;

    #[test]
    fn single_shot_uses_intelligence_mode() {
        let submission =
            PendingSubmission::single_shot("a scientist explains", 12.0).with_first_frame("https://a/f.jpg");
        let body = build_submit_body(&submission, &ProviderLimits::default());

        assert_eq!(body["shot_type"], "intelligence");
        assert_eq!(body["multi_shot"], true);
        assert_eq!(body["image"], "https://a/f.jpg");
        assert_eq!(body["duration"], "12");
    }

    #[test]
    fn multi_shot_caps_duration_at_provider_limit() {
        let submission = PendingSubmission::MultiShot {
            shots: vec![
                ShotSpec { index: 1, prompt: "a".into(), duration_s: 10.0 },
                ShotSpec { index: 2, prompt: "b".into(), duration_s: 10.0 },
            ],
            total_duration_s: 20.0,
            aspect_ratio: "9:16".into(),
            image_url: None,
            character_anchor: None,
            voice_anchor: None,
            callback_url: None,
        };
        let body = build_submit_body(&submission, &ProviderLimits::default());

        assert_eq!(body["shot_type"], "customize");
        assert_eq!(body["duration"], "15");
        assert_eq!(body["multi_prompt"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn quota_codes_map_to_quota_exhausted() {
        for code in KLING_QUOTA_CODES {
            let resp = json!({ "code": code, "message": "no balance" });
            let err = classify_submit_response(&resp).unwrap_err();
            assert!(err.is_quota(), "code {code} should be quota");
        }
    }

    #[test]
    fn business_error_is_rejected_not_quota() {
        let resp = json!({ "code": 1201, "message": "prompt violates policy" });
        let err = classify_submit_response(&resp).unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { code: 1201, .. }));
    }

    #[test]
    fn missing_task_id_is_an_error() {
        let resp = json!({ "code": 0, "data": {} });
        let err = classify_submit_response(&resp).unwrap_err();
        assert!(matches!(err, ProviderError::NoTaskId { .. }));
    }

    #[test]
    fn poll_parses_terminal_states() {
        let succeeded = json!({
            "code": 0,
            "data": {
                "task_status": "succeed",
                "task_result": { "videos": [{ "url": "https://cdn/v.mp4" }] }
            }
        });
        assert_eq!(
            parse_task_status(&succeeded).unwrap(),
            TaskStatus::Succeeded { video_url: "https://cdn/v.mp4".into() }
        );

        let failed = json!({
            "code": 0,
            "data": { "task_status": "failed", "task_status_msg": "nsfw" }
        });
        assert_eq!(
            parse_task_status(&failed).unwrap(),
            TaskStatus::Failed { reason: "nsfw".into() }
        );

        let processing = json!({ "code": 0, "data": { "task_status": "processing" } });
        assert_eq!(parse_task_status(&processing).unwrap(), TaskStatus::Processing);
    }
}
