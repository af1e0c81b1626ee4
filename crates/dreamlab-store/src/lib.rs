//! PostgREST-backed persistence for jobs, clips and the credit ledger.
//!
//! One shared [`StoreClient`] carries auth, retry and metrics; the
//! repositories layer typed table access on top of it.

pub mod client;
pub mod clips;
pub mod credits;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod retry;

pub use client::{StoreClient, StoreConfig};
pub use clips::{ClipsRepo, NewClip};
pub use credits::{refund_reason_job_failed, refund_reason_submit_failed, CreditsRepo};
pub use error::{StoreError, StoreResult};
pub use jobs::JobsRepo;
pub use retry::RetryConfig;
