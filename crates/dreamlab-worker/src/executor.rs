//! Composition executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dreamlab_media::FfmpegRunner;
use dreamlab_pipeline::adapters::{FfmpegMediaOps, R2AssetStore, SqlJobStore};
use dreamlab_pipeline::{Pipeline, PipelineConfig};
use dreamlab_provider::ProviderRouter;
use dreamlab_queue::{StitchJob, StitchQueue};
use dreamlab_storage::R2Client;
use dreamlab_store::{CreditsRepo, StoreClient, StoreConfig};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Executor that pulls stitch messages off the queue and composes the
/// final videos.
pub struct StitchExecutor {
    config: WorkerConfig,
    queue: Arc<StitchQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl StitchExecutor {
    /// Create a new executor.
    pub fn new(config: WorkerConfig, queue: StitchQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Build the pipeline the worker composes through. Same wiring as
    /// the API side, except FFmpeg gets a timeout sized for full-video
    /// renders.
    async fn build_pipeline(&self) -> anyhow::Result<Pipeline> {
        let store_client = StoreClient::new(StoreConfig::from_env()?)?;
        let storage = R2Client::from_env().await?;
        let runner = FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout_secs);

        Ok(Pipeline::new(
            Arc::new(SqlJobStore::new(store_client.clone())),
            Arc::new(ProviderRouter::from_env()?),
            Arc::new(R2AssetStore::new(storage)),
            Arc::new(CreditsRepo::new(store_client)),
            self.queue.clone(),
            Arc::new(FfmpegMediaOps::new(runner)),
            PipelineConfig::from_env(),
        ))
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting stitch executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let pipeline = match self.build_pipeline().await {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to build pipeline: {}", e);
                return Err(WorkerError::job_failed(e.to_string()));
            }
        };

        let mut shutdown_rx = self.shutdown.subscribe();

        // Spawn a task to claim pending jobs periodically
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let pipeline_clone = pipeline.clone();
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_min_idle_ms = self.config.claim_min_idle_ms;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle_ms, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending stitch jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let pipeline = pipeline_clone.clone();
                                    let queue = Arc::clone(&queue_clone);
                                    let permit = match semaphore_clone.clone().acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(pipeline, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending stitch jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs(&pipeline) => {
                    if let Err(e) = result {
                        error!("Error consuming stitch jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight compositions to complete...");
        let _ = tokio::time::timeout(Duration::from_secs(60), self.wait_for_jobs()).await;

        info!("Stitch executor stopped");
        Ok(())
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self, pipeline: &Pipeline) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} stitch jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let pipeline = pipeline.clone();
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(pipeline, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single composition with retry and DLQ handling.
    async fn execute_job(
        pipeline: Pipeline,
        queue: Arc<StitchQueue>,
        message_id: String,
        job: StitchJob,
    ) {
        info!("Composing job {}", job.job_id);
        let started = std::time::Instant::now();

        let result = pipeline.compose_job(job.job_id).await;

        match result {
            Ok(()) => {
                info!(
                    "Composition for job {} completed in {:.1}s",
                    job.job_id,
                    started.elapsed().as_secs_f64()
                );
                metrics::counter!("dreamlab_worker_compositions_total").increment(1);
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack stitch for job {}: {}", job.job_id, e);
                }
                // Clear dedup key so the same job can be re-stitched later
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job.job_id, e);
                }
            }
            Err(e) => {
                error!("Composition for job {} failed: {}", job.job_id, e);
                metrics::counter!("dreamlab_worker_composition_failures_total").increment(1);

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(999);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Stitch for job {} exceeded max retries ({}), moving to DLQ",
                        job.job_id, max_retries
                    );
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!("Failed to move job {} to DLQ: {}", job.job_id, dlq_err);
                    }
                    // Clear dedup key so the job can be retried manually later
                    if let Err(e) = queue.clear_dedup(&job).await {
                        warn!("Failed to clear dedup key for job {}: {}", job.job_id, e);
                    }
                } else {
                    info!(
                        "Stitch for job {} will be retried (attempt {}/{})",
                        job.job_id, retry_count, max_retries
                    );
                    // Redelivered after the visibility timeout
                }
            }
        }
    }

    /// Wait for all in-flight compositions to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
