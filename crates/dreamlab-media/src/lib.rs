//! FFmpeg CLI wrapper for video processing.
//!
//! This crate provides:
//! - A multi-input command builder and a runner with timeout enforcement
//! - Clip normalization and crossfade concatenation with hard-concat fallback
//! - Diagram picture-in-picture and subtitle burn-in
//! - Tail-frame extraction for continuity chaining
//! - FFprobe duration/dimension probing

pub mod command;
pub mod compose;
pub mod concat;
pub mod error;
pub mod frame;
pub mod probe;
pub mod workspace;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{build_drawtext, compose_pip_clip, find_font, pip_geometry, PipGeometry};
pub use concat::{build_crossfade_filters, crossfade_concat, hard_concat, normalize_clip, FADE_S};
pub use error::{MediaError, MediaResult};
pub use frame::{extract_last_frame, TAIL_OFFSET_S};
pub use probe::{probe_video, video_duration, VideoInfo};
pub use workspace::Workspace;
