//! Typed deferred-submission payloads.
//!
//! Groups after the first are not submitted when a job launches; they
//! wait on the previous clip's completion so the chainer can seed them
//! with a continuity frame. The waiting request is stored on the clip
//! row as a `PendingSubmission` — a schema'd tagged union rather than
//! free-form JSON, so a malformed payload fails when the row is decoded,
//! not in the middle of a chain step.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subject-library reference for the cast member, with an image fallback
/// for casts not yet registered with the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CharacterAnchor {
    /// Registered subject-library element
    Element { element_id: String },
    /// Frontal reference image
    Image { frontal_image_url: String },
}

/// Cloned-voice reference carried alongside a character anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceAnchor {
    pub voice_id: String,
}

/// One storyboarded shot inside a multi-shot submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotSpec {
    /// 1-based shot index within the submission
    pub index: u32,
    pub prompt: String,
    pub duration_s: f64,
}

/// A future provider submission, reconstructed by the frame chainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PendingSubmission {
    /// One combined prompt; the provider auto-cuts camera work
    SingleShot {
        prompt: String,
        total_duration_s: f64,
        #[serde(default = "default_aspect_ratio")]
        aspect_ratio: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        character_anchor: Option<CharacterAnchor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_anchor: Option<VoiceAnchor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        callback_url: Option<String>,
    },
    /// Per-shot prompts, full storyboard control
    MultiShot {
        shots: Vec<ShotSpec>,
        total_duration_s: f64,
        #[serde(default = "default_aspect_ratio")]
        aspect_ratio: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        character_anchor: Option<CharacterAnchor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_anchor: Option<VoiceAnchor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        callback_url: Option<String>,
    },
}

fn default_aspect_ratio() -> String {
    "9:16".to_string()
}

impl PendingSubmission {
    /// Minimal single-shot payload (tests and splice jobs).
    pub fn single_shot(prompt: impl Into<String>, total_duration_s: f64) -> Self {
        Self::SingleShot {
            prompt: prompt.into(),
            total_duration_s,
            aspect_ratio: default_aspect_ratio(),
            image_url: None,
            character_anchor: None,
            voice_anchor: None,
            callback_url: None,
        }
    }

    pub fn total_duration_s(&self) -> f64 {
        match self {
            Self::SingleShot { total_duration_s, .. } | Self::MultiShot { total_duration_s, .. } => {
                *total_duration_s
            }
        }
    }

    pub fn aspect_ratio(&self) -> &str {
        match self {
            Self::SingleShot { aspect_ratio, .. } | Self::MultiShot { aspect_ratio, .. } => {
                aspect_ratio
            }
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::SingleShot { image_url, .. } | Self::MultiShot { image_url, .. } => {
                image_url.as_deref()
            }
        }
    }

    pub fn callback_url(&self) -> Option<&str> {
        match self {
            Self::SingleShot { callback_url, .. } | Self::MultiShot { callback_url, .. } => {
                callback_url.as_deref()
            }
        }
    }

    /// Replace the seed image with a continuity frame extracted from the
    /// previous clip.
    pub fn with_first_frame(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            Self::SingleShot { image_url, .. } | Self::MultiShot { image_url, .. } => {
                *image_url = Some(url.into());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_roundtrip() {
        let payload = PendingSubmission::MultiShot {
            shots: vec![
                ShotSpec { index: 1, prompt: "opening".into(), duration_s: 5.0 },
                ShotSpec { index: 2, prompt: "reaction".into(), duration_s: 4.0 },
            ],
            total_duration_s: 9.0,
            aspect_ratio: "9:16".into(),
            image_url: Some("https://assets.example/seed.jpg".into()),
            character_anchor: Some(CharacterAnchor::Element { element_id: "el-1".into() }),
            voice_anchor: None,
            callback_url: Some("https://app.example/api/webhooks/kling".into()),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"multi_shot\""));
        let back: PendingSubmission = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn malformed_payload_is_rejected_at_decode() {
        // Untagged blobs must fail when the row is decoded, not later.
        let untagged = r#"{"_deferred":true,"prompt":"scene"}"#;
        assert!(serde_json::from_str::<PendingSubmission>(untagged).is_err());

        let unknown_kind = r#"{"kind":"triple_shot","prompt":"x","total_duration_s":5.0}"#;
        assert!(serde_json::from_str::<PendingSubmission>(unknown_kind).is_err());
    }

    #[test]
    fn with_first_frame_replaces_seed() {
        let payload = PendingSubmission::single_shot("scene", 5.0)
            .with_first_frame("https://assets.example/frames/0.jpg");
        assert_eq!(payload.image_url(), Some("https://assets.example/frames/0.jpg"));
    }
}
