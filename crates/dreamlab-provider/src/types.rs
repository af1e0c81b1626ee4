//! Shared provider types.

use dreamlab_models::Provider;

/// Normalized task state reported by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Still generating (includes queued)
    Processing,
    Succeeded {
        video_url: String,
    },
    Failed {
        reason: String,
    },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTask {
    pub provider: Provider,
    pub task_id: String,
}
