//! Stuck-task reconciliation.
//!
//! Provider callbacks get lost. Any clip sitting in `submitted` past
//! the staleness window is driven through the same poll-based handler a
//! callback would have hit, so a dropped webhook only delays a job, it
//! never wedges one.

use metrics::counter;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::PipelineResult;
use crate::Pipeline;

impl Pipeline {
    /// One reconciliation pass. Returns how many stale clips were
    /// driven forward.
    pub async fn sweep_stale_clips(&self) -> PipelineResult<usize> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::seconds(self.config.stale_after.as_secs() as i64);
        let stale = self.store.list_stale_submitted(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        info!(count = stale.len(), "Re-polling stale clips");
        let mut driven = 0usize;
        for clip in stale {
            let Some(task_id) = clip.task_id.clone() else {
                continue;
            };
            match self.handle_task_update(&task_id).await {
                Ok(()) => driven += 1,
                Err(e) => {
                    warn!(clip_id = clip.id, task_id, error = %e, "Stale clip re-poll failed");
                    counter!("pipeline_sweep_failures_total").increment(1);
                }
            }
        }
        counter!("pipeline_swept_clips_total").increment(driven as u64);
        Ok(driven)
    }

    /// Spawn the periodic reconciliation loop.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(pipeline.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = pipeline.sweep_stale_clips().await {
                    warn!(error = %e, "Reconciliation sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{fixture_job, pipeline_with_fakes, seeded_clip, two_second_beats};
    use dreamlab_models::{ClipStatus, JobId};
    use dreamlab_provider::TaskStatus;

    #[tokio::test]
    async fn stale_submitted_clip_is_driven_to_completion() {
        let (pipeline, fakes) = pipeline_with_fakes();
        let job = fixture_job(JobId(7), two_second_beats(1), 5);
        fakes.store.seed_job(job);

        let mut clip = seeded_clip(1, JobId(7), 0, ClipStatus::Submitted, Some("task-1"));
        clip.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
        fakes.store.seed_clip(clip);

        fakes.gateway.set_poll("task-1", TaskStatus::Succeeded {
            video_url: "https://cdn.provider/raw.mp4".to_string(),
        });
        fakes.assets.seed_remote("https://cdn.provider/raw.mp4", b"video-bytes".to_vec());

        let driven = pipeline.sweep_stale_clips().await.unwrap();
        assert_eq!(driven, 1);
        assert_eq!(fakes.store.clips_of(JobId(7))[0].status, ClipStatus::Done);
    }

    #[tokio::test]
    async fn fresh_clips_are_left_alone() {
        let (pipeline, fakes) = pipeline_with_fakes();
        let job = fixture_job(JobId(7), two_second_beats(1), 5);
        fakes.store.seed_job(job);
        fakes.store.seed_clip(seeded_clip(1, JobId(7), 0, ClipStatus::Submitted, Some("task-1")));

        let driven = pipeline.sweep_stale_clips().await.unwrap();
        assert_eq!(driven, 0);
        assert_eq!(fakes.store.clips_of(JobId(7))[0].status, ClipStatus::Submitted);
    }
}
