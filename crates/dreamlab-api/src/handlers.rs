//! Request handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use dreamlab_models::JobId;
use dreamlab_queue::{QueueError, StitchJob};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ---------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// Provider callback. The secret gates everything; after that the body
/// only has to yield a task id — all state decisions come from
/// re-polling the provider, so the response is always 2xx once the
/// caller is authenticated (a non-2xx would make the provider retry).
pub async fn provider_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<Value>,
) -> ApiResult<Json<WebhookResponse>> {
    authorize_webhook(&state.config.webhook_secret, query.secret.as_deref())?;

    let Some(task_id) = extract_task_id(&body) else {
        warn!("Webhook body without task id ignored");
        return Ok(Json(WebhookResponse { received: false }));
    };

    info!(task_id = %task_id, "Webhook received");
    metrics::counter!(crate::metrics::names::WEBHOOKS_RECEIVED_TOTAL).increment(1);
    // Ack immediately; the handler re-polls and may run FFmpeg.
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.handle_task_update(&task_id).await {
            warn!(task_id = %task_id, error = %e, "Webhook-driven update failed");
        }
    });

    Ok(Json(WebhookResponse { received: true }))
}

fn authorize_webhook(expected: &str, provided: Option<&str>) -> ApiResult<()> {
    match provided {
        Some(secret) if secret == expected => Ok(()),
        _ => Err(ApiError::unauthorized("invalid webhook secret")),
    }
}

/// Pull the provider task id out of a callback body. Kling nests it
/// under `data`, Seedance posts it at the top level.
fn extract_task_id(body: &Value) -> Option<String> {
    body.get("task_id")
        .or_else(|| body.pointer("/data/task_id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------
// Stitch trigger
// ---------------------------------------------------------------------

#[derive(Serialize)]
pub struct StitchResponse {
    pub queued: bool,
}

/// Internal trigger to (re-)enqueue composition for a job. Idempotent;
/// the queue dedups on the job id.
pub async fn trigger_stitch(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<StitchResponse>)> {
    let provided = headers
        .get("x-stitch-secret")
        .and_then(|v| v.to_str().ok());
    if provided != Some(state.config.stitch_secret.as_str()) {
        return Err(ApiError::unauthorized("invalid stitch secret"));
    }

    let result = state.queue.enqueue(StitchJob::new(JobId(job_id))).await;
    let queued = stitch_outcome(job_id, result.map(|_| ()))?;
    metrics::counter!(crate::metrics::names::STITCH_TRIGGERS_TOTAL).increment(1);
    Ok((StatusCode::ACCEPTED, Json(StitchResponse { queued })))
}

/// A job already waiting in the queue is a success for the caller, not
/// an error; the trigger acks with `queued: false` instead of failing.
fn stitch_outcome(job_id: i64, result: Result<(), QueueError>) -> ApiResult<bool> {
    match result {
        Ok(()) => {
            info!(job_id, "Stitch trigger accepted");
            Ok(true)
        }
        Err(QueueError::Duplicate(_)) => {
            info!(job_id, "Stitch trigger already queued");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub redis: CheckStatus,
    pub storage: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }
}

/// Readiness check endpoint. Checks Redis and R2 connectivity.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    use std::time::Instant;

    let redis_check = {
        let start = Instant::now();
        match state.queue.len().await {
            Ok(_) => CheckStatus::ok(start.elapsed().as_millis() as u64),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let storage_check = {
        let start = Instant::now();
        match state.storage.check_connectivity().await {
            Ok(_) => CheckStatus::ok(start.elapsed().as_millis() as u64),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let all_ok = redis_check.status == "ok" && storage_check.status == "ok";
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            redis: redis_check,
            storage: storage_check,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
