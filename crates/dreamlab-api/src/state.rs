//! Application state.

use std::sync::Arc;

use dreamlab_media::FfmpegRunner;
use dreamlab_pipeline::adapters::{FfmpegMediaOps, R2AssetStore, SqlJobStore};
use dreamlab_pipeline::{Pipeline, PipelineConfig};
use dreamlab_provider::ProviderRouter;
use dreamlab_queue::StitchQueue;
use dreamlab_storage::R2Client;
use dreamlab_store::{CreditsRepo, StoreClient, StoreConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Pipeline,
    pub queue: Arc<StitchQueue>,
    pub storage: Arc<R2Client>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store_client = StoreClient::new(StoreConfig::from_env()?)?;
        let storage = Arc::new(R2Client::from_env().await?);
        let queue = Arc::new(StitchQueue::from_env()?);
        queue.init().await?;

        let pipeline = Pipeline::new(
            Arc::new(SqlJobStore::new(store_client.clone())),
            Arc::new(ProviderRouter::from_env()?),
            Arc::new(R2AssetStore::new((*storage).clone())),
            Arc::new(CreditsRepo::new(store_client)),
            queue.clone(),
            Arc::new(FfmpegMediaOps::new(FfmpegRunner::new())),
            PipelineConfig::from_env(),
        );

        Ok(Self {
            config,
            pipeline,
            queue,
            storage,
        })
    }
}
