//! Frame chaining.
//!
//! Deferred groups are promoted strictly in clip order, each seeded with
//! a still pulled from the tail of the clip that just finished so shots
//! keep visual continuity across provider calls. Frame extraction is
//! best-effort: if it fails the group is submitted with its original
//! seed image. A failed submission is terminal for that clip, and the
//! chain moves on to the next waiting group.

use metrics::counter;
use tracing::{info, warn};

use dreamlab_media::Workspace;
use dreamlab_models::{Clip, JobId};
use dreamlab_storage::frame_key;

use crate::error::PipelineResult;
use crate::Pipeline;

impl Pipeline {
    /// Promote the next deferred group, if any. `completed` carries the
    /// clip that just finished and its video bytes, when one did.
    pub(crate) async fn chain_next(
        &self,
        job_id: JobId,
        completed: Option<(&Clip, &[u8])>,
    ) -> PipelineResult<()> {
        let clips = self.store.list_clips(job_id).await?;
        let Some(next) = clips
            .iter()
            .filter(|c| c.awaits_chaining())
            .min_by_key(|c| c.clip_index)
        else {
            return Ok(());
        };
        let Some(deferred) = next.deferred.clone() else {
            return Ok(());
        };

        let mut submission = deferred;
        if let Some((prev, bytes)) = completed {
            match self.continuity_frame(prev, bytes).await {
                Ok(frame_url) => submission = submission.with_first_frame(frame_url),
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        clip_index = prev.clip_index,
                        error = %e,
                        "Continuity frame extraction failed, using original seed"
                    );
                    counter!("pipeline_frame_extraction_failures_total").increment(1);
                }
            }
        }

        match self.gateway.submit(next.provider, &submission).await {
            Ok(task_id) => {
                self.store
                    .promote_clip(next.id, &task_id, submission.image_url())
                    .await?;
                info!(
                    job_id = %job_id,
                    clip_index = next.clip_index,
                    provider = %next.provider,
                    task_id = %task_id,
                    "Deferred group submitted"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    clip_index = next.clip_index,
                    error = %e,
                    "Deferred submission failed"
                );
                counter!("pipeline_chain_failures_total").increment(1);
                self.store.mark_clip_failed(next.id, &e.to_string()).await?;
                // Keep the chain moving past the dead group.
                Box::pin(self.chain_next(job_id, None)).await
            }
        }
    }

    /// Extract the tail frame of a finished clip and persist it next to
    /// the job's other assets. The frame URL is recorded on the finished
    /// clip as well, so the seed of every chained group stays traceable.
    async fn continuity_frame(&self, prev: &Clip, bytes: &[u8]) -> PipelineResult<String> {
        let work = Workspace::create()?;
        let video_path = work.file("prev.mp4");
        tokio::fs::write(&video_path, bytes).await?;

        let frame_path = work.file("frame.jpg");
        self.media
            .extract_tail_frame(&video_path, &frame_path)
            .await?;

        let key = frame_key(prev.job_id, prev.clip_index);
        let frame_url = self
            .assets
            .upload_file(&frame_path, &key, "image/jpeg")
            .await?;
        self.store.set_first_frame(prev.id, &frame_url).await?;
        Ok(frame_url)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{
        deferred_clip, fixture_job, pipeline_with_fakes, seeded_clip, two_second_beats,
    };
    use dreamlab_models::{ClipStatus, JobId, JobStatus, PendingSubmission};
    use dreamlab_provider::TaskStatus;

    #[tokio::test]
    async fn completed_clip_seeds_the_next_group_with_its_tail_frame() {
        let (pipeline, fakes) = pipeline_with_fakes();
        let job = fixture_job(JobId(7), two_second_beats(2), 5);
        fakes.store.seed_job(job);
        fakes.store.seed_clip(seeded_clip(1, JobId(7), 0, ClipStatus::Submitted, Some("task-1")));
        fakes.store.seed_clip(deferred_clip(
            2,
            JobId(7),
            1,
            PendingSubmission::single_shot("second scene", 4.0),
        ));
        fakes.gateway.set_poll("task-1", TaskStatus::Succeeded {
            video_url: "https://cdn.provider/raw.mp4".to_string(),
        });
        fakes.assets.seed_remote("https://cdn.provider/raw.mp4", b"video-bytes".to_vec());
        fakes.gateway.queue_submit_ok("task-2");

        pipeline.handle_task_update("task-1").await.unwrap();

        let clips = fakes.store.clips_of(JobId(7));
        assert_eq!(clips[0].status, ClipStatus::Done);
        // the finished clip keeps a record of the frame it handed on
        assert_eq!(
            clips[0].first_frame_url.as_deref(),
            Some("https://cdn.test/jobs/7/frames/0.jpg")
        );
        assert_eq!(clips[1].status, ClipStatus::Submitted);
        assert_eq!(clips[1].task_id.as_deref(), Some("task-2"));
        assert_eq!(
            clips[1].first_frame_url.as_deref(),
            Some("https://cdn.test/jobs/7/frames/0.jpg")
        );
        assert!(clips[1].deferred.is_none());
        assert_eq!(fakes.media.extractions(), 1);
        // one group still in flight, so composition is not queued yet
        assert_eq!(fakes.store.job(JobId(7)).status, JobStatus::Generating);
    }

    #[tokio::test]
    async fn extraction_failure_falls_back_to_the_original_seed() {
        let (pipeline, fakes) = pipeline_with_fakes();
        let job = fixture_job(JobId(7), two_second_beats(2), 5);
        fakes.store.seed_job(job);
        fakes.store.seed_clip(seeded_clip(1, JobId(7), 0, ClipStatus::Submitted, Some("task-1")));
        fakes.store.seed_clip(deferred_clip(
            2,
            JobId(7),
            1,
            PendingSubmission::single_shot("second scene", 4.0)
                .with_first_frame("https://a/seed.jpg"),
        ));
        fakes.gateway.set_poll("task-1", TaskStatus::Succeeded {
            video_url: "https://cdn.provider/raw.mp4".to_string(),
        });
        fakes.assets.seed_remote("https://cdn.provider/raw.mp4", b"video-bytes".to_vec());
        fakes.media.fail_extractions();
        fakes.gateway.queue_submit_ok("task-2");

        pipeline.handle_task_update("task-1").await.unwrap();

        let clips = fakes.store.clips_of(JobId(7));
        assert_eq!(clips[1].status, ClipStatus::Submitted);
        assert_eq!(clips[1].first_frame_url.as_deref(), Some("https://a/seed.jpg"));
    }

    #[tokio::test]
    async fn failed_deferred_submission_moves_the_chain_along() {
        let (pipeline, fakes) = pipeline_with_fakes();
        let job = fixture_job(JobId(7), two_second_beats(3), 5);
        fakes.store.seed_job(job);
        fakes.store.seed_clip(seeded_clip(1, JobId(7), 0, ClipStatus::Submitted, Some("task-1")));
        fakes.store.seed_clip(deferred_clip(
            2,
            JobId(7),
            1,
            PendingSubmission::single_shot("second scene", 4.0),
        ));
        fakes.store.seed_clip(deferred_clip(
            3,
            JobId(7),
            2,
            PendingSubmission::single_shot("third scene", 4.0),
        ));
        fakes.gateway.set_poll("task-1", TaskStatus::Succeeded {
            video_url: "https://cdn.provider/raw.mp4".to_string(),
        });
        fakes.assets.seed_remote("https://cdn.provider/raw.mp4", b"video-bytes".to_vec());
        fakes.gateway.queue_submit_err("quota exhausted");
        fakes.gateway.queue_submit_ok("task-3");

        pipeline.handle_task_update("task-1").await.unwrap();

        let clips = fakes.store.clips_of(JobId(7));
        assert_eq!(clips[1].status, ClipStatus::Failed);
        assert_eq!(clips[2].status, ClipStatus::Submitted);
        assert_eq!(clips[2].task_id.as_deref(), Some("task-3"));
        // the pass-along group gets no continuity frame
        assert!(clips[2].first_frame_url.is_none());
    }

    #[tokio::test]
    async fn chain_promotes_the_lowest_waiting_index_first() {
        let (pipeline, fakes) = pipeline_with_fakes();
        let job = fixture_job(JobId(7), two_second_beats(3), 5);
        fakes.store.seed_job(job);
        fakes.store.seed_clip(seeded_clip(1, JobId(7), 0, ClipStatus::Submitted, Some("task-1")));
        // seeded out of order on purpose
        fakes.store.seed_clip(deferred_clip(
            3,
            JobId(7),
            2,
            PendingSubmission::single_shot("third scene", 4.0),
        ));
        fakes.store.seed_clip(deferred_clip(
            2,
            JobId(7),
            1,
            PendingSubmission::single_shot("second scene", 4.0),
        ));
        fakes.gateway.set_poll("task-1", TaskStatus::Succeeded {
            video_url: "https://cdn.provider/raw.mp4".to_string(),
        });
        fakes.assets.seed_remote("https://cdn.provider/raw.mp4", b"video-bytes".to_vec());
        fakes.gateway.queue_submit_ok("task-2");

        pipeline.handle_task_update("task-1").await.unwrap();

        let clips = fakes.store.clips_of(JobId(7));
        assert_eq!(clips[1].clip_index, 1);
        assert_eq!(clips[1].status, ClipStatus::Submitted);
        assert_eq!(clips[2].clip_index, 2);
        assert!(clips[2].awaits_chaining());
    }
}
