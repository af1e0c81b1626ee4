//! Job launch: routing, grouping, credit debit and the first
//! submission.
//!
//! Only the first group goes to the provider synchronously. Every later
//! group is written to its clip row as a deferred payload and promoted
//! by the chainer once the preceding clip finishes, so each group can be
//! seeded with a continuity frame.

use metrics::counter;
use tracing::{info, warn};

use dreamlab_models::{
    CharacterAnchor, ClipStatus, Job, PendingSubmission, Provider, ProviderLimits, ScriptBeat,
    ShotSpec, VoiceAnchor,
};
use dreamlab_store::{refund_reason_submit_failed, NewClip};

use crate::error::{PipelineError, PipelineResult};
use crate::grouper::{group_beats, ClipGroup};
use crate::ports::VideoGateway;
use crate::Pipeline;

/// Resolve every beat to a provider.
///
/// A beat that carries a pre-routed provider keeps it; the rest are
/// routed from the job's strategy, its cast kind and whether the beat
/// has dialogue.
pub fn route_beats(job: &Job, gateway: &dyn VideoGateway) -> Vec<(ScriptBeat, Provider)> {
    job.script
        .iter()
        .map(|beat| {
            let provider = beat.provider.unwrap_or_else(|| {
                gateway.select(job.metadata.routing, job.metadata.cast, beat.has_dialogue())
            });
            (beat.clone(), provider)
        })
        .collect()
}

/// Render one beat into the instruction text sent to the provider.
pub fn beat_prompt(beat: &ScriptBeat) -> String {
    let mut parts: Vec<String> = Vec::new();

    let framing: Vec<&str> = [beat.shot_type.as_deref(), beat.camera_movement.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !framing.is_empty() {
        parts.push(format!("[{}]", framing.join(", ")));
    }

    parts.push(beat.shot_description.clone());

    if beat.has_dialogue() {
        parts.push(format!("Speak naturally: \"{}\"", beat.dialogue.trim()));
    }
    if let Some(anchor) = &beat.consistency_anchor {
        parts.push(anchor.clone());
    }
    if let Some(anchor) = &beat.scene_anchor {
        parts.push(anchor.clone());
    }

    parts.join(" ")
}

/// Build the provider payload for one group.
///
/// One beat collapses to a single-shot request; the provider handles
/// camera work on its own. Multiple beats become a storyboard with
/// 1-based shot indices.
pub fn build_submission(group: &ClipGroup, job: &Job, callback_url: Option<&str>) -> PendingSubmission {
    let meta = &job.metadata;
    let character_anchor = match (&meta.character_element_id, &meta.frontal_image_url) {
        (Some(element_id), _) => Some(CharacterAnchor::Element {
            element_id: element_id.clone(),
        }),
        (None, Some(url)) => Some(CharacterAnchor::Image {
            frontal_image_url: url.clone(),
        }),
        (None, None) => None,
    };
    let voice_anchor = meta.voice_id.clone().map(|voice_id| VoiceAnchor { voice_id });

    let total_duration_s = group.total_duration_s();
    let image_url = meta.frontal_image_url.clone();
    let callback_url = callback_url.map(str::to_string);

    if let [beat] = group.beats.as_slice() {
        PendingSubmission::SingleShot {
            prompt: beat_prompt(beat),
            total_duration_s,
            aspect_ratio: job.aspect_ratio.clone(),
            image_url,
            character_anchor,
            voice_anchor,
            callback_url,
        }
    } else {
        PendingSubmission::MultiShot {
            shots: group
                .beats
                .iter()
                .enumerate()
                .map(|(i, beat)| ShotSpec {
                    index: i as u32 + 1,
                    prompt: beat_prompt(beat),
                    duration_s: beat.duration_s,
                })
                .collect(),
            total_duration_s,
            aspect_ratio: job.aspect_ratio.clone(),
            image_url,
            character_anchor,
            voice_anchor,
            callback_url,
        }
    }
}

/// Paper jobs composite one diagram per clip, so every beat gets its own
/// group.
fn effective_limits(job: &Job, base: ProviderLimits) -> ProviderLimits {
    if job.metadata.is_paper() {
        ProviderLimits {
            max_shots: 1,
            ..base
        }
    } else {
        base
    }
}

fn group_prompt(group: &ClipGroup) -> String {
    group
        .beats
        .iter()
        .map(beat_prompt)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Pipeline {
    /// Launch a job: debit credits, persist one clip row per group, and
    /// submit the first group.
    ///
    /// If that submission fails nothing can ever chain, so the job is
    /// failed immediately and the debit refunded.
    pub async fn launch_job(&self, job: &Job) -> PipelineResult<()> {
        if job.script.is_empty() {
            return Err(PipelineError::invalid_state(format!(
                "job {} has an empty script",
                job.id
            )));
        }

        let limits = effective_limits(job, self.gateway.limits());
        let routed = route_beats(job, self.gateway.as_ref());
        let groups = group_beats(&routed, &limits);

        if job.credit_cost > 0 {
            self.ledger
                .deduct(&job.user_id, job.credit_cost, &format!("job:{}", job.id))
                .await?;
        }

        let callback = self.config.callback_url.as_deref();
        let rows: Vec<NewClip> = groups
            .iter()
            .enumerate()
            .map(|(i, group)| NewClip {
                job_id: job.id,
                clip_index: i as u32,
                status: ClipStatus::Pending,
                provider: group.provider,
                prompt: group_prompt(group),
                task_id: None,
                deferred: (i > 0).then(|| build_submission(group, job, callback)),
            })
            .collect();
        let clips = self.store.insert_clips(rows).await?;

        let first = clips
            .iter()
            .find(|c| c.clip_index == 0)
            .ok_or_else(|| PipelineError::invalid_state(format!("job {} has no first clip", job.id)))?;

        let submission = build_submission(&groups[0], job, callback);
        match self.gateway.submit(groups[0].provider, &submission).await {
            Ok(task_id) => {
                self.store.promote_clip(first.id, &task_id, None).await?;
                counter!("pipeline_jobs_launched_total").increment(1);
                info!(
                    job_id = %job.id,
                    groups = groups.len(),
                    provider = %groups[0].provider,
                    task_id = %task_id,
                    "Job launched"
                );
                Ok(())
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "First submission failed, failing job");
                counter!("pipeline_launch_failures_total").increment(1);

                self.store.mark_clip_failed(first.id, &e.to_string()).await?;
                for clip in clips.iter().filter(|c| c.clip_index != 0) {
                    self.store
                        .mark_clip_failed(clip.id, "first group was never submitted")
                        .await?;
                }
                self.store
                    .fail_job(job.id, &format!("Submission failed: {e}"))
                    .await?;
                self.refund_if_eligible(job, &refund_reason_submit_failed(job.id))
                    .await?;
                Err(e)
            }
        }
    }
}
