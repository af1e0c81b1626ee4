//! Clip definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobId;
use crate::provider::Provider;
use crate::submission::PendingSubmission;

/// Clip lifecycle state.
///
/// `Pending` clips either await their synchronous submission or carry a
/// deferred payload and wait for the frame chainer. Only the webhook
/// handler and the chainer move a clip into a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    /// Not yet visible to the provider
    Pending,
    /// Submitted; waiting for the provider callback
    Submitted,
    /// Asset generated and persisted durably
    Done,
    /// Generation or submission failed
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Pending => "pending",
            ClipStatus::Submitted => "submitted",
            ClipStatus::Done => "done",
            ClipStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClipStatus::Done | ClipStatus::Failed)
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work submitted to a generation provider.
///
/// `clip_index` is 0-based, contiguous and unique per job, and defines
/// the final composition order. At most one non-terminal clip may hold a
/// given `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub id: i64,

    pub job_id: JobId,

    pub clip_index: u32,

    pub status: ClipStatus,

    #[serde(default)]
    pub provider: Provider,

    /// Opaque provider task identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Instruction text actually sent to the provider
    #[serde(default)]
    pub prompt: String,

    /// Typed deferred payload; present only while the clip waits for the
    /// previous clip's completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred: Option<PendingSubmission>,

    /// Continuity anchor used to seed this clip's generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,

    /// Durable asset URL; set only when status is `Done`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Clip {
    /// Create a pending clip row.
    pub fn pending(id: i64, job_id: JobId, clip_index: u32, provider: Provider) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_id,
            clip_index,
            status: ClipStatus::Pending,
            provider,
            task_id: None,
            prompt: String::new(),
            deferred: None,
            first_frame_url: None,
            video_url: None,
            error_msg: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a deferred payload (clip becomes chainer-owned).
    pub fn with_deferred(mut self, deferred: PendingSubmission) -> Self {
        self.deferred = Some(deferred);
        self
    }

    /// True when the frame chainer may promote this clip.
    pub fn awaits_chaining(&self) -> bool {
        self.status == ClipStatus::Pending && self.deferred.is_some()
    }
}
