//! Shared data models for the Dreamlab video pipeline.
//!
//! The job/clip rows here are the system of record for the whole
//! orchestration: a `Job` is one user-requested video, a `Clip` is one
//! unit of work submitted to a generation provider, and a
//! `PendingSubmission` is the typed deferred payload that the frame
//! chainer promotes into a real submission once the previous clip lands.

pub mod clip;
pub mod job;
pub mod provider;
pub mod script;
pub mod submission;

pub use clip::{Clip, ClipStatus};
pub use job::{Job, JobId, JobMetadata, JobStatus};
pub use provider::{CastKind, Provider, ProviderLimits, RoutingStrategy};
pub use script::ScriptBeat;
pub use submission::{CharacterAnchor, PendingSubmission, ShotSpec, VoiceAnchor};
