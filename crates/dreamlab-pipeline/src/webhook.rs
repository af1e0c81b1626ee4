//! Provider callback handling.
//!
//! A callback is a hint, not a verdict: the handler re-polls the
//! provider for the authoritative task state before acting, so a forged
//! or stale callback can never complete a clip. Terminal clips absorb
//! duplicate callbacks silently.

use metrics::counter;
use tracing::{debug, error, info, warn};

use dreamlab_models::{Clip, ClipStatus, Job, JobId, JobStatus};
use dreamlab_provider::TaskStatus;
use dreamlab_storage::clip_key;
use dreamlab_store::refund_reason_job_failed;

use crate::error::PipelineResult;
use crate::Pipeline;

impl Pipeline {
    /// Handle a provider task update, whether it arrived as a webhook
    /// callback or from the reconciliation sweep.
    pub async fn handle_task_update(&self, task_id: &str) -> PipelineResult<()> {
        let Some(clip) = self.store.find_clip_by_task(task_id).await? else {
            warn!(task_id, "Update for unknown task ignored");
            return Ok(());
        };
        if clip.status.is_terminal() {
            debug!(clip_id = clip.id, task_id, "Clip already terminal, ignoring");
            return Ok(());
        }

        match self.gateway.poll(clip.provider, task_id).await? {
            TaskStatus::Processing => {
                debug!(clip_id = clip.id, task_id, "Task still processing");
                Ok(())
            }
            TaskStatus::Succeeded { video_url } => self.finish_clip(&clip, &video_url).await,
            TaskStatus::Failed { reason } => {
                warn!(clip_id = clip.id, task_id, reason, "Clip generation failed");
                counter!("pipeline_clip_failures_total").increment(1);
                self.store.mark_clip_failed(clip.id, &reason).await?;
                // The chain keeps moving; the next group just loses its
                // continuity frame.
                self.chain_next(clip.job_id, None).await?;
                self.evaluate_job(clip.job_id).await
            }
        }
    }

    /// Persist a finished clip durably, then advance the chain and
    /// re-evaluate the job.
    async fn finish_clip(&self, clip: &Clip, provider_url: &str) -> PipelineResult<()> {
        let bytes = self.assets.fetch_remote(provider_url).await?;
        let key = clip_key(clip.job_id, clip.clip_index);
        let durable_url = self
            .assets
            .upload_bytes(bytes.clone(), &key, "video/mp4")
            .await?;
        self.store.mark_clip_done(clip.id, &durable_url).await?;
        counter!("pipeline_clips_done_total").increment(1);
        info!(
            clip_id = clip.id,
            job_id = %clip.job_id,
            clip_index = clip.clip_index,
            "Clip done"
        );

        self.chain_next(clip.job_id, Some((clip, &bytes))).await?;
        self.evaluate_job(clip.job_id).await
    }

    /// Move the job forward once every clip is terminal: to `stitching`
    /// when anything succeeded, to `failed` (with refund) when nothing
    /// did. The guarded transition makes concurrent evaluations safe.
    pub(crate) async fn evaluate_job(&self, job_id: JobId) -> PipelineResult<()> {
        let clips = self.store.list_clips(job_id).await?;
        if clips.is_empty() || clips.iter().any(|c| !c.status.is_terminal()) {
            return Ok(());
        }

        if clips.iter().any(|c| c.status == ClipStatus::Done) {
            if self
                .store
                .transition_job(job_id, JobStatus::Generating, JobStatus::Stitching)
                .await?
            {
                info!(%job_id, "All clips terminal, composition queued");
                self.stitcher.trigger(job_id).await?;
            }
            return Ok(());
        }

        let job = self.store.get_job(job_id).await?;
        if job.status == JobStatus::Generating {
            self.store.fail_job(job_id, "All clips failed").await?;
            self.refund_if_eligible(&job, &refund_reason_job_failed(job_id))
                .await?;
        }
        Ok(())
    }

    /// Refund the job's debit at most once, guarded by the one-time
    /// claim on the job row.
    pub(crate) async fn refund_if_eligible(&self, job: &Job, reason: &str) -> PipelineResult<()> {
        if job.credit_cost == 0 {
            return Ok(());
        }
        if !self.store.try_mark_refunded(job.id).await? {
            debug!(job_id = %job.id, "Refund already claimed");
            return Ok(());
        }
        if let Err(e) = self.ledger.add(&job.user_id, job.credit_cost, reason).await {
            // The claim is already burned; never retry the credit here.
            error!(job_id = %job.id, error = %e, "Refund credit failed after claim");
            counter!("pipeline_refund_failures_total").increment(1);
            return Err(e);
        }
        counter!("pipeline_refunds_total").increment(1);
        info!(job_id = %job.id, amount = job.credit_cost, reason, "Credits refunded");
        Ok(())
    }
}
