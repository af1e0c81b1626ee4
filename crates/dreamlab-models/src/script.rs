//! Script beats — the narrative units a job is generated from.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// One narrative unit inside a job's script: dialogue, a shot
/// description, a target duration, and optional compositing anchors.
///
/// Beats are read-only input to grouping; the pipeline never mutates
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptBeat {
    pub index: u32,

    /// Cast member slug speaking this beat (empty for pure B-roll)
    #[serde(default)]
    pub speaker: String,

    #[serde(default)]
    pub dialogue: String,

    pub shot_description: String,

    /// Target duration in seconds
    pub duration_s: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_movement: Option<String>,

    /// Cross-shot visual lock: one-line binding of character look, scene
    /// and lighting, repeated verbatim in every prompt of the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_anchor: Option<String>,

    /// Scene-only environment anchor shared by beats in one location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_anchor: Option<String>,

    /// Diagram to overlay during composition (paper sub-type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_index: Option<usize>,

    /// Pre-routed provider; beats without one are routed by content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}

impl ScriptBeat {
    /// Minimal beat, mostly for tests and synthetic splice scripts.
    pub fn new(index: u32, shot_description: impl Into<String>, duration_s: f64) -> Self {
        Self {
            index,
            speaker: String::new(),
            dialogue: String::new(),
            shot_description: shot_description.into(),
            duration_s,
            shot_type: None,
            camera_movement: None,
            consistency_anchor: None,
            scene_anchor: None,
            diagram_index: None,
            provider: None,
        }
    }

    pub fn with_dialogue(mut self, dialogue: impl Into<String>) -> Self {
        self.dialogue = dialogue.into();
        self
    }

    pub fn has_dialogue(&self) -> bool {
        !self.dialogue.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialogue_detection_ignores_whitespace() {
        let beat = ScriptBeat::new(0, "wide shot of a city", 5.0).with_dialogue("  ");
        assert!(!beat.has_dialogue());

        let beat = beat.with_dialogue("hello");
        assert!(beat.has_dialogue());
    }

    #[test]
    fn beat_roundtrips_through_json() {
        let mut beat = ScriptBeat::new(3, "close-up", 4.5).with_dialogue("line");
        beat.consistency_anchor = Some("red coat, dusk light".to_string());
        beat.diagram_index = Some(1);

        let json = serde_json::to_string(&beat).unwrap();
        let back: ScriptBeat = serde_json::from_str(&json).unwrap();
        assert_eq!(beat, back);
    }
}
