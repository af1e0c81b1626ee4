//! Job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::{CastKind, RoutingStrategy};
use crate::script::ScriptBeat;

/// Unique identifier for a job (row id in the jobs table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// A job is created in `Generating`; the webhook handler moves it to
/// `Stitching` once every clip is terminal with at least one success, or
/// to `Failed` when nothing succeeded. The composition worker owns the
/// `Stitching -> Done` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Clips are being generated by the provider
    Generating,
    /// All clips terminal, composition in progress
    Stitching,
    /// Final asset produced
    Done,
    /// No clip succeeded
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Generating => "generating",
            JobStatus::Stitching => "stitching",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-variant metadata attached to a job.
///
/// `splice_mode` jobs replace a time range of an existing finished video:
/// the composition concatenates `[before?] + generated + [after?]` and
/// also updates the original job's final URL in place. The `paper`
/// sub-type selects diagram picture-in-picture compositing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobMetadata {
    /// Job-level provider strategy
    #[serde(default)]
    pub routing: RoutingStrategy,

    /// Cast member kind; constrains provider choice
    #[serde(default)]
    pub cast: CastKind,

    /// Subject-library element for the cast member, when registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_element_id: Option<String>,

    /// Frontal reference image fallback for unregistered casts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontal_image_url: Option<String>,

    /// Cloned voice id for dialogue delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    #[serde(default)]
    pub splice_mode: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice_before_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice_after_url: Option<String>,

    /// Original job whose final video a splice job rewrites
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_job_id: Option<JobId>,

    /// Compositing sub-type ("paper" enables diagram overlays)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,

    /// Per-diagram candidate image URLs, indexed by `ScriptBeat::diagram_index`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagram_urls: Vec<Vec<String>>,
}

impl JobMetadata {
    pub fn is_paper(&self) -> bool {
        self.sub_type.as_deref() == Some("paper")
    }
}

/// One user-requested video, composed of one or more clips.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,

    pub user_id: String,

    pub status: JobStatus,

    /// Ordered script; immutable once clip rows exist
    #[serde(default)]
    pub script: Vec<ScriptBeat>,

    /// Target aspect ratio, e.g. "9:16"
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Credits debited at creation; refundable exactly once
    #[serde(default)]
    pub credit_cost: u32,

    /// One-time refund guard
    #[serde(default)]
    pub refunded: bool,

    #[serde(default)]
    pub metadata: JobMetadata,

    /// Set exactly once, when composition succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

fn default_aspect_ratio() -> String {
    "9:16".to_string()
}

impl Job {
    /// Create a job in its initial state (used by submission and tests).
    pub fn new(id: JobId, user_id: impl Into<String>, script: Vec<ScriptBeat>, credit_cost: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            status: JobStatus::Generating,
            script,
            aspect_ratio: default_aspect_ratio(),
            credit_cost,
            refunded: false,
            metadata: JobMetadata::default(),
            final_video_url: None,
            error_msg: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
