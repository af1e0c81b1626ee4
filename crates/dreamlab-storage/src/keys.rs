//! Object key layout for job assets.
//!
//! Everything a job produces lives under `jobs/{job_id}/`, so cleanup
//! and auditing are a single prefix listing.

use dreamlab_models::JobId;

/// Durable copy of a generated clip, named by composition index.
pub fn clip_key(job_id: JobId, clip_index: u32) -> String {
    format!("jobs/{}/clips/{}.mp4", job_id, clip_index)
}

/// Continuity frame extracted from the tail of a finished clip.
pub fn frame_key(job_id: JobId, clip_index: u32) -> String {
    format!("jobs/{}/frames/{}.jpg", job_id, clip_index)
}

/// Final composed video for the job.
pub fn final_key(job_id: JobId) -> String {
    format!("jobs/{}/final.mp4", job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_job_prefix() {
        let job = JobId(42);
        assert_eq!(clip_key(job, 3), "jobs/42/clips/3.mp4");
        assert_eq!(frame_key(job, 3), "jobs/42/frames/3.jpg");
        assert_eq!(final_key(job), "jobs/42/final.mp4");
    }
}
