//! Capability traits the orchestration handlers run against.
//!
//! Production wiring (see `adapters`) maps each trait onto the concrete
//! client crates; tests run the same handlers against in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dreamlab_models::{
    CastKind, Clip, Job, JobId, JobStatus, PendingSubmission, Provider, ProviderLimits,
    RoutingStrategy,
};
use dreamlab_provider::TaskStatus;
use dreamlab_store::NewClip;

use crate::error::PipelineResult;

/// Persistence for jobs and their clips.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: JobId) -> PipelineResult<Job>;

    /// Guarded transition; returns true when this caller won it.
    async fn transition_job(
        &self,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    ) -> PipelineResult<bool>;

    async fn fail_job(&self, job_id: JobId, error_msg: &str) -> PipelineResult<()>;

    async fn complete_job(&self, job_id: JobId, final_video_url: &str) -> PipelineResult<()>;

    /// Rewrite the final URL of an already-finished job (splice target).
    async fn set_final_video(&self, job_id: JobId, final_video_url: &str) -> PipelineResult<()>;

    /// One-time refund claim; true only for the winner.
    async fn try_mark_refunded(&self, job_id: JobId) -> PipelineResult<bool>;

    async fn insert_clips(&self, rows: Vec<NewClip>) -> PipelineResult<Vec<Clip>>;

    /// All clips of a job in composition order.
    async fn list_clips(&self, job_id: JobId) -> PipelineResult<Vec<Clip>>;

    async fn find_clip_by_task(&self, task_id: &str) -> PipelineResult<Option<Clip>>;

    async fn promote_clip(
        &self,
        clip_id: i64,
        task_id: &str,
        first_frame_url: Option<&str>,
    ) -> PipelineResult<Clip>;

    async fn mark_clip_done(&self, clip_id: i64, video_url: &str) -> PipelineResult<Clip>;

    /// Record the continuity frame extracted from a finished clip.
    async fn set_first_frame(&self, clip_id: i64, first_frame_url: &str) -> PipelineResult<Clip>;

    async fn mark_clip_failed(&self, clip_id: i64, error_msg: &str) -> PipelineResult<Clip>;

    /// Clips stuck in `submitted` since before `cutoff`.
    async fn list_stale_submitted(&self, cutoff: DateTime<Utc>) -> PipelineResult<Vec<Clip>>;
}

/// Provider routing, submission and polling.
#[async_trait]
pub trait VideoGateway: Send + Sync {
    fn limits(&self) -> ProviderLimits;

    fn select(&self, strategy: RoutingStrategy, cast: CastKind, has_dialogue: bool) -> Provider;

    async fn submit(
        &self,
        provider: Provider,
        submission: &PendingSubmission,
    ) -> PipelineResult<String>;

    async fn poll(&self, provider: Provider, task_id: &str) -> PipelineResult<TaskStatus>;
}

/// Durable asset storage plus remote fetch for provider-hosted videos.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fetch a remote asset (provider CDN URL) into memory.
    async fn fetch_remote(&self, url: &str) -> PipelineResult<Vec<u8>>;

    /// Upload bytes; returns the public URL.
    async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> PipelineResult<String>;

    /// Upload a local file; returns the public URL.
    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> PipelineResult<String>;
}

/// Credit ledger.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn deduct(&self, user_id: &str, amount: u32, reason: &str) -> PipelineResult<()>;

    async fn add(&self, user_id: &str, amount: u32, reason: &str) -> PipelineResult<()>;
}

/// Hands a finished job to the composition worker.
#[async_trait]
pub trait StitchTrigger: Send + Sync {
    /// Enqueue composition. Duplicate triggers must be absorbed, not
    /// surfaced as errors.
    async fn trigger(&self, job_id: JobId) -> PipelineResult<()>;
}

/// FFmpeg-backed media operations used by composition and chaining.
#[async_trait]
pub trait MediaOps: Send + Sync {
    /// Extract a still from the tail of a clip.
    async fn extract_tail_frame(&self, video: &Path, frame: &Path) -> PipelineResult<()>;

    /// Normalize + crossfade concat with hard-concat fallback.
    async fn crossfade_concat(
        &self,
        inputs: &[std::path::PathBuf],
        output: &Path,
        work_dir: &Path,
    ) -> PipelineResult<()>;

    /// Hard concat with stream copy (splice path).
    async fn hard_concat(
        &self,
        inputs: &[std::path::PathBuf],
        output: &Path,
        work_dir: &Path,
    ) -> PipelineResult<()>;

    /// Diagram picture-in-picture plus subtitle burn-in.
    async fn compose_pip(
        &self,
        clip: &Path,
        diagram: Option<&Path>,
        output: &Path,
        dialogue: &str,
        aspect_ratio: &str,
    ) -> PipelineResult<()>;
}
