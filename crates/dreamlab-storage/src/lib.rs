//! Cloudflare R2 storage for job assets.
//!
//! This crate provides:
//! - Clip, frame and final-video uploads with public URLs
//! - Object download (bytes or file)
//! - Key layout helpers for the `jobs/{job_id}/` prefix

pub mod client;
pub mod error;
pub mod keys;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{clip_key, final_key, frame_key};
