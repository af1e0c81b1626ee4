//! Final composition.
//!
//! Runs on the worker once every clip of a job is terminal. Downloads
//! the successful clips in order, composites per clip (diagram overlays
//! for paper jobs, subtitle burn-in wherever a beat has dialogue),
//! concatenates with crossfades (hard concat for splice jobs), uploads
//! the result and completes the job. Failed clips are skipped, and any
//! failure along the way still delivers the first successful clip's
//! asset; a job never stays in stitching.

use std::path::{Path, PathBuf};
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{info, warn};

use dreamlab_media::Workspace;
use dreamlab_models::{Clip, ClipStatus, Job, JobId, ScriptBeat};
use dreamlab_storage::final_key;
use dreamlab_store::refund_reason_job_failed;

use crate::error::PipelineResult;
use crate::Pipeline;

impl Pipeline {
    /// Compose the final video for a job. Safe to call more than once;
    /// a job that is already done is left alone.
    pub async fn compose_job(&self, job_id: JobId) -> PipelineResult<()> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            info!(%job_id, status = %job.status, "Job already terminal, skipping composition");
            return Ok(());
        }

        let clips = self.store.list_clips(job_id).await?;
        let done: Vec<&Clip> = clips
            .iter()
            .filter(|c| c.status == ClipStatus::Done && c.video_url.is_some())
            .collect();
        if done.is_empty() {
            warn!(%job_id, "Nothing to compose, failing job");
            self.store.fail_job(job_id, "No clips to stitch").await?;
            self.refund_if_eligible(&job, &refund_reason_job_failed(job_id))
                .await?;
            return Ok(());
        }

        // One successful clip and nothing to composite on top of it:
        // its asset already is the final video.
        if !job.metadata.splice_mode && !needs_compositing(&job, &done) {
            if let [only] = done.as_slice() {
                if let Some(url) = only.video_url.as_deref() {
                    self.store.complete_job(job_id, url).await?;
                    counter!("pipeline_jobs_composed_total").increment(1);
                    info!(%job_id, "Single clip, reused its asset as the final video");
                    return Ok(());
                }
            }
        }

        let started = Instant::now();
        // Anything going wrong mid-composition falls back to the first
        // successful clip's durable asset, which needs no upload.
        let (url, composed) = match self.compose_and_upload(&job, &done).await {
            Ok(url) => (url, true),
            Err(e) => match done[0].video_url.clone() {
                Some(fallback) => {
                    warn!(%job_id, error = %e, "Composition failed, delivering first clip as-is");
                    counter!("pipeline_compose_passthrough_total").increment(1);
                    (fallback, false)
                }
                None => return Err(e),
            },
        };
        self.store.complete_job(job_id, &url).await?;

        if composed && job.metadata.splice_mode {
            if let Some(original) = job.metadata.original_job_id {
                self.store.set_final_video(original, &url).await?;
                info!(%job_id, original_job_id = %original, "Splice rewrote original final video");
            }
        }

        counter!("pipeline_jobs_composed_total").increment(1);
        histogram!("pipeline_compose_seconds").record(started.elapsed().as_secs_f64());
        info!(
            %job_id,
            clips = done.len(),
            composed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Composition finished"
        );
        Ok(())
    }

    /// Download, composite, concatenate, upload. Errors here are
    /// absorbed by the passthrough fallback in [`Self::compose_job`].
    async fn compose_and_upload(&self, job: &Job, done: &[&Clip]) -> PipelineResult<String> {
        let work = Workspace::create()?;

        let mut sources: Vec<PathBuf> = Vec::with_capacity(done.len());
        for clip in done {
            let Some(url) = clip.video_url.as_deref() else {
                continue;
            };
            let path = work.file(&format!("clip_{}.mp4", clip.clip_index));
            self.fetch_to(url, &path).await?;
            sources.push(path);
        }

        let sources = self.composite_clips(job, done, sources, work.path()).await?;

        let final_path = work.file("final.mp4");
        let upload_path = if job.metadata.splice_mode {
            self.splice(job, &sources, &final_path, work.path()).await?;
            final_path
        } else if let [only] = sources.as_slice() {
            // already composited, nothing left to join
            only.clone()
        } else {
            self.media
                .crossfade_concat(&sources, &final_path, work.path())
                .await?;
            final_path
        };

        self.assets
            .upload_file(&upload_path, &final_key(job.id), "video/mp4")
            .await
    }

    /// Per-clip compositing. Paper jobs put each clip in a corner over
    /// their diagram; any beat with dialogue gets it burned in as
    /// subtitles. Clips with nothing to composite pass through raw, and
    /// a failed compositing pass degrades to the raw clip.
    async fn composite_clips(
        &self,
        job: &Job,
        done: &[&Clip],
        sources: Vec<PathBuf>,
        work_dir: &Path,
    ) -> PipelineResult<Vec<PathBuf>> {
        let paper = job.metadata.is_paper();
        let mut composed = Vec::with_capacity(sources.len());
        for (clip, source) in done.iter().zip(sources) {
            let beat = job.script.get(clip.clip_index as usize);
            let dialogue = beat.map(|b| b.dialogue.as_str()).unwrap_or("");

            if !paper && !beat.is_some_and(|b| b.has_dialogue()) {
                composed.push(source);
                continue;
            }

            let diagram_path = if paper {
                self.fetch_diagram(job, clip, beat, work_dir).await
            } else {
                None
            };

            let out = work_dir.join(format!("composed_{}.mp4", clip.clip_index));
            match self
                .media
                .compose_pip(&source, diagram_path.as_deref(), &out, dialogue, &job.aspect_ratio)
                .await
            {
                Ok(()) => composed.push(out),
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        clip_index = clip.clip_index,
                        error = %e,
                        "Compositing failed, using raw clip"
                    );
                    counter!("pipeline_overlay_failures_total").increment(1);
                    composed.push(source);
                }
            }
        }
        Ok(composed)
    }

    /// Resolve and download a paper clip's diagram. A beat without an
    /// explicit index defaults to the diagram at its clip position, and
    /// a failed download composites without the diagram.
    async fn fetch_diagram(
        &self,
        job: &Job,
        clip: &Clip,
        beat: Option<&ScriptBeat>,
        work_dir: &Path,
    ) -> Option<PathBuf> {
        let index = beat
            .and_then(|b| b.diagram_index)
            .unwrap_or(clip.clip_index as usize);
        let url = job.metadata.diagram_urls.get(index).and_then(|c| c.first())?;

        let path = work_dir.join(format!("diagram_{}.png", clip.clip_index));
        match self.fetch_to(url, &path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    clip_index = clip.clip_index,
                    error = %e,
                    "Diagram fetch failed, compositing without it"
                );
                None
            }
        }
    }

    /// Splice: `[before?] + generated + [after?]`, stream-copied so the
    /// untouched ranges of the original are not re-encoded.
    async fn splice(
        &self,
        job: &Job,
        sources: &[PathBuf],
        final_path: &Path,
        work_dir: &Path,
    ) -> PipelineResult<()> {
        let generated = if let [only] = sources {
            only.clone()
        } else {
            let path = work_dir.join("generated.mp4");
            self.media.crossfade_concat(sources, &path, work_dir).await?;
            path
        };

        let mut parts: Vec<PathBuf> = Vec::with_capacity(3);
        if let Some(url) = &job.metadata.splice_before_url {
            let path = work_dir.join("before.mp4");
            self.fetch_to(url, &path).await?;
            parts.push(path);
        }
        parts.push(generated);
        if let Some(url) = &job.metadata.splice_after_url {
            let path = work_dir.join("after.mp4");
            self.fetch_to(url, &path).await?;
            parts.push(path);
        }

        self.media.hard_concat(&parts, final_path, work_dir).await
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> PipelineResult<()> {
        let bytes = self.assets.fetch_remote(url).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// True when at least one clip needs a compositing pass (diagram
/// overlay or subtitle burn-in) before concatenation.
fn needs_compositing(job: &Job, done: &[&Clip]) -> bool {
    job.metadata.is_paper()
        || done.iter().any(|clip| {
            job.script
                .get(clip.clip_index as usize)
                .is_some_and(|beat| beat.has_dialogue())
        })
}
