//! Queue payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dreamlab_models::JobId;

/// Request to compose a job's finished clips into the final video.
///
/// Enqueued by whichever webhook callback observes the last clip reach
/// a terminal state. Duplicate triggers for one job are absorbed by the
/// dedup key, and composition itself is a no-op on already-done jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchJob {
    pub job_id: JobId,
    pub requested_at: DateTime<Utc>,
}

impl StitchJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            requested_at: Utc::now(),
        }
    }

    /// Idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("stitch:{}", self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_depends_only_on_job() {
        let a = StitchJob::new(JobId(42));
        let b = StitchJob::new(JobId(42));
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_eq!(a.idempotency_key(), "stitch:42");
    }

    #[test]
    fn payload_roundtrips() {
        let job = StitchJob::new(JobId(7));
        let json = serde_json::to_string(&job).unwrap();
        let back: StitchJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, JobId(7));
    }
}
