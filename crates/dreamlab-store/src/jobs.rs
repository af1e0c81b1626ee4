//! Job repository.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use dreamlab_models::{Job, JobId, JobStatus};

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};

/// Typed access to the `jobs` table.
#[derive(Clone)]
pub struct JobsRepo {
    client: StoreClient,
}

impl JobsRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, job_id: JobId) -> StoreResult<Job> {
        let rows: Vec<Job> = self
            .client
            .select("get_job", &format!("jobs?id=eq.{}&select=*", job_id))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(format!("jobs/{job_id}")))
    }

    pub async fn insert(&self, job: &Job) -> StoreResult<Job> {
        let rows: Vec<Job> = self.client.insert("insert_job", "jobs", job).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::invalid_response("insert returned no rows"))
    }

    pub async fn set_status(&self, job_id: JobId, status: JobStatus) -> StoreResult<()> {
        let _: Vec<Job> = self
            .client
            .update(
                "set_job_status",
                &format!("jobs?id=eq.{}", job_id),
                &json!({
                    "status": status.as_str(),
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Transition `from -> to` only if the job is still in `from`.
    ///
    /// Returns `true` when this caller won the transition. Concurrent
    /// webhook handlers race on `generating -> stitching`; the filter
    /// on the current status makes the race harmless.
    pub async fn transition(
        &self,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    ) -> StoreResult<bool> {
        let rows: Vec<Job> = self
            .client
            .update(
                "transition_job",
                &format!("jobs?id=eq.{}&status=eq.{}", job_id, from.as_str()),
                &json!({
                    "status": to.as_str(),
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        let won = !rows.is_empty();
        debug!(job_id = %job_id, from = %from, to = %to, won, "job transition");
        Ok(won)
    }

    pub async fn fail(&self, job_id: JobId, error_msg: &str) -> StoreResult<()> {
        let _: Vec<Job> = self
            .client
            .update(
                "fail_job",
                &format!("jobs?id=eq.{}", job_id),
                &json!({
                    "status": JobStatus::Failed.as_str(),
                    "error_msg": error_msg,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Set the final asset URL and mark the job done.
    pub async fn complete(&self, job_id: JobId, final_video_url: &str) -> StoreResult<()> {
        let _: Vec<Job> = self
            .client
            .update(
                "complete_job",
                &format!("jobs?id=eq.{}", job_id),
                &json!({
                    "status": JobStatus::Done.as_str(),
                    "final_video_url": final_video_url,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Rewrite the final URL of an already-finished job (splice target).
    pub async fn set_final_video(&self, job_id: JobId, final_video_url: &str) -> StoreResult<()> {
        let _: Vec<Job> = self
            .client
            .update(
                "set_final_video",
                &format!("jobs?id=eq.{}", job_id),
                &json!({
                    "final_video_url": final_video_url,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Claim the one-time refund flag. Returns `true` only for the
    /// caller that flipped `refunded` from false to true.
    pub async fn try_mark_refunded(&self, job_id: JobId) -> StoreResult<bool> {
        let rows: Vec<Job> = self
            .client
            .update(
                "claim_refund",
                &format!("jobs?id=eq.{}&refunded=eq.false", job_id),
                &json!({
                    "refunded": true,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
