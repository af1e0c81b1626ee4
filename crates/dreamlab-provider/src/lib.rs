//! Video generation provider integration.
//!
//! This crate provides:
//! - Kling and Seedance API clients (submit + poll)
//! - Uniform business-error classification (quota / rejected / transient)
//! - An in-process quota breaker with cooldown
//! - Content-based provider routing

pub mod breaker;
pub mod error;
pub mod kling;
pub mod retry;
pub mod router;
pub mod seedance;
pub mod types;

pub use breaker::{ProviderBreaker, DEFAULT_BLOCK_DURATION};
pub use error::{ProviderError, ProviderResult};
pub use kling::{KlingClient, KlingConfig, KLING_QUOTA_CODES};
pub use router::{select_clip_provider, ProviderRouter};
pub use seedance::{SeedanceClient, SeedanceConfig};
pub use types::{SubmittedTask, TaskStatus};
