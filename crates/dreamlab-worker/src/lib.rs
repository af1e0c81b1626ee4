//! Composition worker for the video pipeline.
//!
//! Consumes stitch messages from the Redis queue and drives final
//! video composition through the pipeline crate.

pub mod config;
pub mod error;
pub mod executor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::StitchExecutor;
