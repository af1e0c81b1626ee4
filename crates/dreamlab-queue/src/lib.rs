//! Redis Streams queue for composition work.
//!
//! This crate provides:
//! - Stitch-trigger enqueueing with idempotent deduplication
//! - Worker consumption with retry counters and a DLQ
//! - Crashed-consumer recovery via XCLAIM

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::StitchJob;
pub use queue::{QueueConfig, StitchQueue};
