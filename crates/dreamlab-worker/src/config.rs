//! Worker configuration.

/// Composition worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max compositions running at once
    pub max_concurrent_jobs: usize,
    /// FFmpeg timeout per invocation, in seconds
    pub ffmpeg_timeout_secs: u64,
    /// How long a pending message may sit with a dead consumer before
    /// another worker claims it, in milliseconds
    pub claim_min_idle_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            ffmpeg_timeout_secs: 900,
            claim_min_idle_ms: 300_000,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            ffmpeg_timeout_secs: std::env::var("WORKER_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            claim_min_idle_ms: std::env::var("WORKER_CLAIM_MIN_IDLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.claim_min_idle_ms),
        }
    }
}
