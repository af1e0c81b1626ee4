//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors crossing the orchestration layer. Wraps each capability's
/// error so handlers can still match on the cause (quota vs rejection,
/// retryable vs final).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] dreamlab_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] dreamlab_storage::StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] dreamlab_provider::ProviderError),

    #[error("Media error: {0}")]
    Media(#[from] dreamlab_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] dreamlab_queue::QueueError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True when the underlying provider reported its account out of
    /// quota.
    pub fn is_quota(&self) -> bool {
        matches!(self, PipelineError::Provider(e) if e.is_quota())
    }
}
