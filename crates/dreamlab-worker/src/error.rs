//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] dreamlab_queue::QueueError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] dreamlab_pipeline::PipelineError),

    #[error("Store error: {0}")]
    Store(#[from] dreamlab_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] dreamlab_storage::StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] dreamlab_provider::ProviderError),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }
}
