//! Clip repository.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use dreamlab_models::{Clip, ClipStatus, JobId, PendingSubmission, Provider};

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};

/// Insert payload for a clip row; ids and timestamps are assigned by
/// the database.
#[derive(Debug, Clone, Serialize)]
pub struct NewClip {
    pub job_id: JobId,
    pub clip_index: u32,
    pub status: ClipStatus,
    pub provider: Provider,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred: Option<PendingSubmission>,
}

/// Typed access to the `clips` table.
#[derive(Clone)]
pub struct ClipsRepo {
    client: StoreClient,
}

impl ClipsRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// All clips of a job in composition order.
    pub async fn list_for_job(&self, job_id: JobId) -> StoreResult<Vec<Clip>> {
        self.client
            .select(
                "list_clips",
                &format!("clips?job_id=eq.{}&select=*&order=clip_index.asc", job_id),
            )
            .await
    }

    /// Resolve a provider callback to its clip. At most one non-terminal
    /// clip holds a given task id.
    pub async fn find_by_task_id(&self, task_id: &str) -> StoreResult<Option<Clip>> {
        let encoded = urlencoding::encode(task_id);
        let rows: Vec<Clip> = self
            .client
            .select(
                "find_clip_by_task",
                &format!("clips?task_id=eq.{}&select=*", encoded),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_many(&self, rows: &[NewClip]) -> StoreResult<Vec<Clip>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.client.insert("insert_clips", "clips", &rows).await
    }

    /// Record a successful provider submission: the clip becomes
    /// `submitted` and its deferred payload (if any) is consumed.
    pub async fn promote_to_submitted(
        &self,
        clip_id: i64,
        task_id: &str,
        first_frame_url: Option<&str>,
    ) -> StoreResult<Clip> {
        let body = json!({
            "status": ClipStatus::Submitted.as_str(),
            "task_id": task_id,
            "first_frame_url": first_frame_url,
            "deferred": serde_json::Value::Null,
            "updated_at": Utc::now(),
        });
        self.patch_one("promote_clip", clip_id, &body).await
    }

    /// Record the tail frame pulled from a finished clip.
    pub async fn set_first_frame(&self, clip_id: i64, first_frame_url: &str) -> StoreResult<Clip> {
        let body = json!({
            "first_frame_url": first_frame_url,
            "updated_at": Utc::now(),
        });
        self.patch_one("clip_frame", clip_id, &body).await
    }

    pub async fn mark_done(&self, clip_id: i64, video_url: &str) -> StoreResult<Clip> {
        let body = json!({
            "status": ClipStatus::Done.as_str(),
            "video_url": video_url,
            "updated_at": Utc::now(),
        });
        self.patch_one("clip_done", clip_id, &body).await
    }

    pub async fn mark_failed(&self, clip_id: i64, error_msg: &str) -> StoreResult<Clip> {
        let body = json!({
            "status": ClipStatus::Failed.as_str(),
            "error_msg": error_msg,
            "deferred": serde_json::Value::Null,
            "updated_at": Utc::now(),
        });
        self.patch_one("clip_failed", clip_id, &body).await
    }

    /// Clips stuck in `submitted` since before `cutoff` (reconciliation
    /// sweep input).
    pub async fn list_stale_submitted(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> StoreResult<Vec<Clip>> {
        let ts = urlencoding::encode(&cutoff.to_rfc3339()).into_owned();
        self.client
            .select(
                "list_stale_clips",
                &format!(
                    "clips?status=eq.submitted&updated_at=lt.{}&select=*&order=job_id.asc",
                    ts
                ),
            )
            .await
    }

    async fn patch_one(
        &self,
        operation: &str,
        clip_id: i64,
        body: &serde_json::Value,
    ) -> StoreResult<Clip> {
        let rows: Vec<Clip> = self
            .client
            .update(operation, &format!("clips?id=eq.{}", clip_id), body)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(format!("clips/{clip_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{StoreClient, StoreConfig};
    use crate::retry::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(base_url: &str) -> ClipsRepo {
        ClipsRepo::new(
            StoreClient::new(StoreConfig {
                base_url: base_url.to_string(),
                service_key: "k".into(),
                timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(1),
                retry: RetryConfig {
                    max_retries: 0,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
            })
            .unwrap(),
        )
    }

    fn clip_row(id: i64, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "job_id": 7,
            "clip_index": 0,
            "status": status,
            "provider": "kling",
            "prompt": "a scene",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn list_orders_by_clip_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/clips"))
            .and(query_param("order", "clip_index.asc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([clip_row(1, "done"), clip_row(2, "pending")])),
            )
            .mount(&server)
            .await;

        let clips = repo(&server.uri()).list_for_job(JobId(7)).await.unwrap();
        assert_eq!(clips.len(), 2);
    }

    #[tokio::test]
    async fn promote_consumes_deferred_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/clips"))
            .and(body_partial_json(json!({
                "status": "submitted",
                "task_id": "task-9",
                "deferred": null
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([clip_row(1, "submitted")])))
            .mount(&server)
            .await;

        let clip = repo(&server.uri())
            .promote_to_submitted(1, "task-9", Some("https://a/frame.jpg"))
            .await
            .unwrap();
        assert_eq!(clip.status, ClipStatus::Submitted);
    }

    #[tokio::test]
    async fn find_by_task_id_returns_none_for_unknown_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/clips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let clip = repo(&server.uri()).find_by_task_id("nope").await.unwrap();
        assert!(clip.is_none());
    }
}
