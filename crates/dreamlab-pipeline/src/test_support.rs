//! In-memory fakes for the capability traits, shared by the handler
//! tests in this crate.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dreamlab_models::{
    CastKind, Clip, ClipStatus, Job, JobId, JobStatus, PendingSubmission, Provider,
    ProviderLimits, RoutingStrategy, ScriptBeat,
};
use dreamlab_provider::{select_clip_provider, ProviderError, TaskStatus};
use dreamlab_store::NewClip;

use crate::error::{PipelineError, PipelineResult};
use crate::ports::{AssetStore, CreditLedger, JobStore, MediaOps, StitchTrigger, VideoGateway};
use crate::{Pipeline, PipelineConfig};

pub fn two_second_beats(n: u32) -> Vec<ScriptBeat> {
    (0..n)
        .map(|i| ScriptBeat::new(i, format!("scene {i}"), 2.0))
        .collect()
}

pub fn fixture_job(id: JobId, script: Vec<ScriptBeat>, credit_cost: u32) -> Job {
    Job::new(id, "u-1", script, credit_cost)
}

pub fn seeded_clip(
    id: i64,
    job_id: JobId,
    clip_index: u32,
    status: ClipStatus,
    task_id: Option<&str>,
) -> Clip {
    let mut clip = Clip::pending(id, job_id, clip_index, Provider::Kling);
    clip.status = status;
    clip.task_id = task_id.map(str::to_string);
    clip
}

pub fn deferred_clip(id: i64, job_id: JobId, clip_index: u32, payload: PendingSubmission) -> Clip {
    Clip::pending(id, job_id, clip_index, Provider::Kling).with_deferred(payload)
}

pub fn done_clip(id: i64, job_id: JobId, clip_index: u32, video_url: &str) -> Clip {
    let mut clip = seeded_clip(id, job_id, clip_index, ClipStatus::Done, Some("task-done"));
    clip.video_url = Some(video_url.to_string());
    clip
}

pub struct Fakes {
    pub store: Arc<FakeStore>,
    pub gateway: Arc<FakeGateway>,
    pub assets: Arc<FakeAssets>,
    pub ledger: Arc<FakeLedger>,
    pub stitcher: Arc<FakeStitcher>,
    pub media: Arc<FakeMedia>,
}

pub fn pipeline_with_fakes() -> (Pipeline, Fakes) {
    let fakes = Fakes {
        store: Arc::new(FakeStore::default()),
        gateway: Arc::new(FakeGateway::default()),
        assets: Arc::new(FakeAssets::default()),
        ledger: Arc::new(FakeLedger::default()),
        stitcher: Arc::new(FakeStitcher::default()),
        media: Arc::new(FakeMedia::default()),
    };
    let pipeline = Pipeline::new(
        fakes.store.clone(),
        fakes.gateway.clone(),
        fakes.assets.clone(),
        fakes.ledger.clone(),
        fakes.stitcher.clone(),
        fakes.media.clone(),
        PipelineConfig::default(),
    );
    (pipeline, fakes)
}

// ---------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    clips: Mutex<Vec<Clip>>,
    next_clip_id: AtomicI64,
}

impl FakeStore {
    pub fn seed_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn seed_clip(&self, clip: Clip) {
        self.clips.lock().unwrap().push(clip);
    }

    pub fn job(&self, job_id: JobId) -> Job {
        self.jobs.lock().unwrap().get(&job_id).cloned().unwrap()
    }

    pub fn clips_of(&self, job_id: JobId) -> Vec<Clip> {
        let mut clips: Vec<Clip> = self
            .clips
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect();
        clips.sort_by_key(|c| c.clip_index);
        clips
    }

    fn update_clip(&self, clip_id: i64, f: impl FnOnce(&mut Clip)) -> PipelineResult<Clip> {
        let mut clips = self.clips.lock().unwrap();
        let clip = clips
            .iter_mut()
            .find(|c| c.id == clip_id)
            .ok_or_else(|| PipelineError::not_found(format!("clip {clip_id}")))?;
        f(clip);
        clip.updated_at = Utc::now();
        Ok(clip.clone())
    }

    fn update_job(&self, job_id: JobId, f: impl FnOnce(&mut Job)) -> PipelineResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::not_found(format!("job {job_id}")))?;
        f(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JobStore for FakeStore {
    async fn get_job(&self, job_id: JobId) -> PipelineResult<Job> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(format!("job {job_id}")))
    }

    async fn transition_job(
        &self,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    ) -> PipelineResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::not_found(format!("job {job_id}")))?;
        if job.status == from {
            job.status = to;
            job.updated_at = Utc::now();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn fail_job(&self, job_id: JobId, error_msg: &str) -> PipelineResult<()> {
        self.update_job(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error_msg = Some(error_msg.to_string());
        })
    }

    async fn complete_job(&self, job_id: JobId, final_video_url: &str) -> PipelineResult<()> {
        self.update_job(job_id, |job| {
            job.status = JobStatus::Done;
            job.final_video_url = Some(final_video_url.to_string());
        })
    }

    async fn set_final_video(&self, job_id: JobId, final_video_url: &str) -> PipelineResult<()> {
        self.update_job(job_id, |job| {
            job.final_video_url = Some(final_video_url.to_string());
        })
    }

    async fn try_mark_refunded(&self, job_id: JobId) -> PipelineResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::not_found(format!("job {job_id}")))?;
        if job.refunded {
            Ok(false)
        } else {
            job.refunded = true;
            Ok(true)
        }
    }

    async fn insert_clips(&self, rows: Vec<NewClip>) -> PipelineResult<Vec<Clip>> {
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            let id = self.next_clip_id.fetch_add(1, Ordering::SeqCst) + 1000;
            let mut clip = Clip::pending(id, row.job_id, row.clip_index, row.provider);
            clip.status = row.status;
            clip.prompt = row.prompt;
            clip.task_id = row.task_id;
            clip.deferred = row.deferred;
            self.clips.lock().unwrap().push(clip.clone());
            created.push(clip);
        }
        Ok(created)
    }

    async fn list_clips(&self, job_id: JobId) -> PipelineResult<Vec<Clip>> {
        Ok(self.clips_of(job_id))
    }

    async fn find_clip_by_task(&self, task_id: &str) -> PipelineResult<Option<Clip>> {
        Ok(self
            .clips
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.task_id.as_deref() == Some(task_id))
            .cloned())
    }

    async fn promote_clip(
        &self,
        clip_id: i64,
        task_id: &str,
        first_frame_url: Option<&str>,
    ) -> PipelineResult<Clip> {
        self.update_clip(clip_id, |clip| {
            clip.status = ClipStatus::Submitted;
            clip.task_id = Some(task_id.to_string());
            clip.first_frame_url = first_frame_url.map(str::to_string);
            clip.deferred = None;
        })
    }

    async fn mark_clip_done(&self, clip_id: i64, video_url: &str) -> PipelineResult<Clip> {
        self.update_clip(clip_id, |clip| {
            clip.status = ClipStatus::Done;
            clip.video_url = Some(video_url.to_string());
        })
    }

    async fn set_first_frame(&self, clip_id: i64, first_frame_url: &str) -> PipelineResult<Clip> {
        self.update_clip(clip_id, |clip| {
            clip.first_frame_url = Some(first_frame_url.to_string());
        })
    }

    async fn mark_clip_failed(&self, clip_id: i64, error_msg: &str) -> PipelineResult<Clip> {
        self.update_clip(clip_id, |clip| {
            clip.status = ClipStatus::Failed;
            clip.error_msg = Some(error_msg.to_string());
            clip.deferred = None;
        })
    }

    async fn list_stale_submitted(&self, cutoff: DateTime<Utc>) -> PipelineResult<Vec<Clip>> {
        Ok(self
            .clips
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.status == ClipStatus::Submitted && c.updated_at < cutoff)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGateway {
    seedance_configured: AtomicBool,
    submit_results: Mutex<VecDeque<Result<String, String>>>,
    submissions: Mutex<Vec<(Provider, PendingSubmission)>>,
    poll_results: Mutex<HashMap<String, TaskStatus>>,
    auto_task: AtomicUsize,
}

impl FakeGateway {
    pub fn set_seedance_configured(&self, configured: bool) {
        self.seedance_configured.store(configured, Ordering::SeqCst);
    }

    pub fn queue_submit_ok(&self, task_id: &str) {
        self.submit_results
            .lock()
            .unwrap()
            .push_back(Ok(task_id.to_string()));
    }

    pub fn queue_submit_err(&self, message: &str) {
        self.submit_results
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn set_poll(&self, task_id: &str, status: TaskStatus) {
        self.poll_results
            .lock()
            .unwrap()
            .insert(task_id.to_string(), status);
    }

    pub fn submissions(&self) -> Vec<(Provider, PendingSubmission)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoGateway for FakeGateway {
    fn limits(&self) -> ProviderLimits {
        ProviderLimits::default()
    }

    fn select(&self, strategy: RoutingStrategy, cast: CastKind, has_dialogue: bool) -> Provider {
        select_clip_provider(
            strategy,
            cast,
            has_dialogue,
            self.seedance_configured.load(Ordering::SeqCst),
        )
    }

    async fn submit(
        &self,
        provider: Provider,
        submission: &PendingSubmission,
    ) -> PipelineResult<String> {
        self.submissions
            .lock()
            .unwrap()
            .push((provider, submission.clone()));
        match self.submit_results.lock().unwrap().pop_front() {
            Some(Ok(task_id)) => Ok(task_id),
            Some(Err(message)) => Err(ProviderError::transient(message).into()),
            None => {
                let n = self.auto_task.fetch_add(1, Ordering::SeqCst);
                Ok(format!("task-auto-{n}"))
            }
        }
    }

    async fn poll(&self, _provider: Provider, task_id: &str) -> PipelineResult<TaskStatus> {
        Ok(self
            .poll_results
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or(TaskStatus::Processing))
    }
}

// ---------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAssets {
    remote: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
    fetches: AtomicUsize,
    upload_fails: AtomicBool,
}

impl FakeAssets {
    pub fn seed_remote(&self, url: &str, bytes: Vec<u8>) {
        self.remote.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn fail_uploads(&self) {
        self.upload_fails.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn fetch_remote(&self, url: &str) -> PipelineResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| b"bytes".to_vec()))
    }

    async fn upload_bytes(
        &self,
        _data: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> PipelineResult<String> {
        if self.upload_fails.load(Ordering::SeqCst) {
            return Err(PipelineError::invalid_state("uploads disabled"));
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{key}"))
    }

    async fn upload_file(
        &self,
        _path: &Path,
        key: &str,
        _content_type: &str,
    ) -> PipelineResult<String> {
        if self.upload_fails.load(Ordering::SeqCst) {
            return Err(PipelineError::invalid_state("uploads disabled"));
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{key}"))
    }
}

// ---------------------------------------------------------------------
// Ledger, trigger
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLedger {
    deducts: Mutex<Vec<(String, u32, String)>>,
    adds: Mutex<Vec<(String, u32, String)>>,
}

impl FakeLedger {
    pub fn deducted(&self) -> Vec<(String, u32, String)> {
        self.deducts.lock().unwrap().clone()
    }

    pub fn added(&self) -> Vec<(String, u32, String)> {
        self.adds.lock().unwrap().clone()
    }
}

#[async_trait]
impl CreditLedger for FakeLedger {
    async fn deduct(&self, user_id: &str, amount: u32, reason: &str) -> PipelineResult<()> {
        self.deducts
            .lock()
            .unwrap()
            .push((user_id.to_string(), amount, reason.to_string()));
        Ok(())
    }

    async fn add(&self, user_id: &str, amount: u32, reason: &str) -> PipelineResult<()> {
        self.adds
            .lock()
            .unwrap()
            .push((user_id.to_string(), amount, reason.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStitcher {
    triggered: Mutex<Vec<JobId>>,
}

impl FakeStitcher {
    pub fn triggered(&self) -> Vec<JobId> {
        self.triggered.lock().unwrap().clone()
    }
}

#[async_trait]
impl StitchTrigger for FakeStitcher {
    async fn trigger(&self, job_id: JobId) -> PipelineResult<()> {
        self.triggered.lock().unwrap().push(job_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ComposeCall {
    pub had_diagram: bool,
    pub dialogue: String,
}

#[derive(Default)]
pub struct FakeMedia {
    extractions: AtomicUsize,
    extraction_fails: AtomicBool,
    crossfade_fails: AtomicBool,
    crossfades: Mutex<Vec<usize>>,
    hard_concats: Mutex<Vec<usize>>,
    composes: Mutex<Vec<ComposeCall>>,
}

impl FakeMedia {
    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    pub fn fail_extractions(&self) {
        self.extraction_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_crossfades(&self) {
        self.crossfade_fails.store(true, Ordering::SeqCst);
    }

    pub fn crossfade_input_counts(&self) -> Vec<usize> {
        self.crossfades.lock().unwrap().clone()
    }

    pub fn hard_concat_input_counts(&self) -> Vec<usize> {
        self.hard_concats.lock().unwrap().clone()
    }

    pub fn compose_calls(&self) -> Vec<ComposeCall> {
        self.composes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaOps for FakeMedia {
    async fn extract_tail_frame(&self, _video: &Path, frame: &Path) -> PipelineResult<()> {
        if self.extraction_fails.load(Ordering::SeqCst) {
            return Err(dreamlab_media::MediaError::internal("extraction disabled").into());
        }
        self.extractions.fetch_add(1, Ordering::SeqCst);
        std::fs::write(frame, b"jpg")?;
        Ok(())
    }

    async fn crossfade_concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        _work_dir: &Path,
    ) -> PipelineResult<()> {
        self.crossfades.lock().unwrap().push(inputs.len());
        if self.crossfade_fails.load(Ordering::SeqCst) {
            return Err(dreamlab_media::MediaError::internal("concat disabled").into());
        }
        std::fs::write(output, b"mp4")?;
        Ok(())
    }

    async fn hard_concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        _work_dir: &Path,
    ) -> PipelineResult<()> {
        self.hard_concats.lock().unwrap().push(inputs.len());
        std::fs::write(output, b"mp4")?;
        Ok(())
    }

    async fn compose_pip(
        &self,
        _clip: &Path,
        diagram: Option<&Path>,
        output: &Path,
        dialogue: &str,
        _aspect_ratio: &str,
    ) -> PipelineResult<()> {
        self.composes.lock().unwrap().push(ComposeCall {
            had_diagram: diagram.is_some(),
            dialogue: dialogue.to_string(),
        });
        std::fs::write(output, b"mp4")?;
        Ok(())
    }
}
