//! Production wiring of the capability traits onto the concrete
//! clients.
//!
//! Thin by intention: each impl forwards and lets `?` lift the client's
//! error into [`PipelineError`](crate::PipelineError). Anything with
//! behavior worth testing lives in the client crates themselves.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dreamlab_media::{
    compose_pip_clip, crossfade_concat, extract_last_frame, hard_concat, FfmpegRunner,
};
use dreamlab_models::{
    CastKind, Clip, Job, JobId, JobStatus, PendingSubmission, Provider, ProviderLimits,
    RoutingStrategy,
};
use dreamlab_provider::{ProviderRouter, TaskStatus};
use dreamlab_queue::{StitchJob, StitchQueue};
use dreamlab_storage::R2Client;
use dreamlab_store::{ClipsRepo, CreditsRepo, JobsRepo, NewClip, StoreClient};

use crate::error::PipelineResult;
use crate::ports::{AssetStore, CreditLedger, JobStore, MediaOps, StitchTrigger, VideoGateway};

/// Jobs and clips repositories behind one store handle.
#[derive(Clone)]
pub struct SqlJobStore {
    jobs: JobsRepo,
    clips: ClipsRepo,
}

impl SqlJobStore {
    pub fn new(client: StoreClient) -> Self {
        Self {
            jobs: JobsRepo::new(client.clone()),
            clips: ClipsRepo::new(client),
        }
    }
}

#[async_trait]
impl JobStore for SqlJobStore {
    async fn get_job(&self, job_id: JobId) -> PipelineResult<Job> {
        Ok(self.jobs.get(job_id).await?)
    }

    async fn transition_job(
        &self,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    ) -> PipelineResult<bool> {
        Ok(self.jobs.transition(job_id, from, to).await?)
    }

    async fn fail_job(&self, job_id: JobId, error_msg: &str) -> PipelineResult<()> {
        Ok(self.jobs.fail(job_id, error_msg).await?)
    }

    async fn complete_job(&self, job_id: JobId, final_video_url: &str) -> PipelineResult<()> {
        Ok(self.jobs.complete(job_id, final_video_url).await?)
    }

    async fn set_final_video(&self, job_id: JobId, final_video_url: &str) -> PipelineResult<()> {
        Ok(self.jobs.set_final_video(job_id, final_video_url).await?)
    }

    async fn try_mark_refunded(&self, job_id: JobId) -> PipelineResult<bool> {
        Ok(self.jobs.try_mark_refunded(job_id).await?)
    }

    async fn insert_clips(&self, rows: Vec<NewClip>) -> PipelineResult<Vec<Clip>> {
        Ok(self.clips.insert_many(&rows).await?)
    }

    async fn list_clips(&self, job_id: JobId) -> PipelineResult<Vec<Clip>> {
        Ok(self.clips.list_for_job(job_id).await?)
    }

    async fn find_clip_by_task(&self, task_id: &str) -> PipelineResult<Option<Clip>> {
        Ok(self.clips.find_by_task_id(task_id).await?)
    }

    async fn promote_clip(
        &self,
        clip_id: i64,
        task_id: &str,
        first_frame_url: Option<&str>,
    ) -> PipelineResult<Clip> {
        Ok(self
            .clips
            .promote_to_submitted(clip_id, task_id, first_frame_url)
            .await?)
    }

    async fn mark_clip_done(&self, clip_id: i64, video_url: &str) -> PipelineResult<Clip> {
        Ok(self.clips.mark_done(clip_id, video_url).await?)
    }

    async fn set_first_frame(&self, clip_id: i64, first_frame_url: &str) -> PipelineResult<Clip> {
        Ok(self.clips.set_first_frame(clip_id, first_frame_url).await?)
    }

    async fn mark_clip_failed(&self, clip_id: i64, error_msg: &str) -> PipelineResult<Clip> {
        Ok(self.clips.mark_failed(clip_id, error_msg).await?)
    }

    async fn list_stale_submitted(&self, cutoff: DateTime<Utc>) -> PipelineResult<Vec<Clip>> {
        Ok(self.clips.list_stale_submitted(cutoff).await?)
    }
}

#[async_trait]
impl VideoGateway for ProviderRouter {
    fn limits(&self) -> ProviderLimits {
        *ProviderRouter::limits(self)
    }

    fn select(&self, strategy: RoutingStrategy, cast: CastKind, has_dialogue: bool) -> Provider {
        ProviderRouter::select(self, strategy, cast, has_dialogue)
    }

    async fn submit(
        &self,
        provider: Provider,
        submission: &PendingSubmission,
    ) -> PipelineResult<String> {
        let task = ProviderRouter::submit(self, provider, submission).await?;
        Ok(task.task_id)
    }

    async fn poll(&self, provider: Provider, task_id: &str) -> PipelineResult<TaskStatus> {
        Ok(ProviderRouter::poll(self, provider, task_id).await?)
    }
}

/// R2 for durable assets, plain HTTP for provider-hosted downloads.
pub struct R2AssetStore {
    r2: R2Client,
    http: reqwest::Client,
}

impl R2AssetStore {
    pub fn new(r2: R2Client) -> Self {
        Self {
            r2,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AssetStore for R2AssetStore {
    async fn fetch_remote(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> PipelineResult<String> {
        Ok(self.r2.upload_bytes(data, key, content_type).await?)
    }

    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> PipelineResult<String> {
        Ok(self.r2.upload_file(path, key, content_type).await?)
    }
}

#[async_trait]
impl CreditLedger for CreditsRepo {
    async fn deduct(&self, user_id: &str, amount: u32, reason: &str) -> PipelineResult<()> {
        Ok(CreditsRepo::deduct(self, user_id, amount, reason).await?)
    }

    async fn add(&self, user_id: &str, amount: u32, reason: &str) -> PipelineResult<()> {
        Ok(CreditsRepo::add(self, user_id, amount, reason).await?)
    }
}

#[async_trait]
impl StitchTrigger for StitchQueue {
    async fn trigger(&self, job_id: JobId) -> PipelineResult<()> {
        match self.enqueue(StitchJob::new(job_id)).await {
            Ok(_) => Ok(()),
            // double triggers for one job collapse into the first
            Err(dreamlab_queue::QueueError::Duplicate(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// FFmpeg-backed media operations.
pub struct FfmpegMediaOps {
    runner: FfmpegRunner,
}

impl FfmpegMediaOps {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl MediaOps for FfmpegMediaOps {
    async fn extract_tail_frame(&self, video: &Path, frame: &Path) -> PipelineResult<()> {
        Ok(extract_last_frame(&self.runner, video, frame).await?)
    }

    async fn crossfade_concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        work_dir: &Path,
    ) -> PipelineResult<()> {
        Ok(crossfade_concat(&self.runner, inputs, output, work_dir).await?)
    }

    async fn hard_concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        work_dir: &Path,
    ) -> PipelineResult<()> {
        Ok(hard_concat(&self.runner, inputs, output, work_dir).await?)
    }

    async fn compose_pip(
        &self,
        clip: &Path,
        diagram: Option<&Path>,
        output: &Path,
        dialogue: &str,
        aspect_ratio: &str,
    ) -> PipelineResult<()> {
        Ok(compose_pip_clip(&self.runner, clip, diagram, output, dialogue, aspect_ratio).await?)
    }
}
