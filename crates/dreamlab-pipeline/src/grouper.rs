//! Script-to-group packing.
//!
//! Beats pack greedily into provider calls under the per-call shot and
//! duration ceilings. A provider change always closes the open group,
//! because one call goes to exactly one provider. Order is never
//! changed; group boundaries only.

use dreamlab_models::{Provider, ProviderLimits, ScriptBeat};

/// One provider call's worth of consecutive beats.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipGroup {
    pub provider: Provider,
    pub beats: Vec<ScriptBeat>,
}

impl ClipGroup {
    pub fn total_duration_s(&self) -> f64 {
        self.beats.iter().map(|b| b.duration_s).sum()
    }
}

/// Pack routed beats into groups under `limits`.
///
/// Every beat must already carry its provider (see
/// [`route_beats`](crate::submit::route_beats)). A single beat longer
/// than the duration ceiling still gets its own group; the submission
/// layer caps the requested duration at the provider maximum.
pub fn group_beats(beats: &[(ScriptBeat, Provider)], limits: &ProviderLimits) -> Vec<ClipGroup> {
    let mut groups: Vec<ClipGroup> = Vec::new();
    let mut current: Option<ClipGroup> = None;
    let mut current_duration = 0.0_f64;

    for (beat, provider) in beats {
        if let Some(group) = current.as_mut() {
            let fits = group.provider == *provider
                && group.beats.len() < limits.max_shots
                && current_duration + beat.duration_s <= limits.max_duration_s;
            if fits {
                group.beats.push(beat.clone());
                current_duration += beat.duration_s;
                continue;
            }
            if let Some(done) = current.take() {
                groups.push(done);
            }
        }
        current_duration = beat.duration_s;
        current = Some(ClipGroup {
            provider: *provider,
            beats: vec![beat.clone()],
        });
    }

    if let Some(group) = current {
        groups.push(group);
    }

    groups
}
