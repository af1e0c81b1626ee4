//! Job orchestration.
//!
//! The [`Pipeline`] owns the full clip lifecycle: routing and grouping
//! a script, submitting the first group, absorbing provider callbacks,
//! chaining deferred groups with continuity frames, reconciling stuck
//! tasks, and composing the final video.
//!
//! Handlers run against the capability traits in [`ports`]; production
//! wiring lives in [`adapters`].

use std::sync::Arc;
use std::time::Duration;

pub mod adapters;
pub mod chain;
pub mod error;
pub mod grouper;
pub mod ports;
pub mod stitch;
pub mod submit;
pub mod sweeper;
pub mod webhook;

#[cfg(test)]
pub mod test_support;

pub use error::{PipelineError, PipelineResult};
pub use grouper::{group_beats, ClipGroup};
pub use submit::{beat_prompt, build_submission, route_beats};

use ports::{AssetStore, CreditLedger, JobStore, MediaOps, StitchTrigger, VideoGateway};

/// Orchestration tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Public webhook URL handed to providers with each submission
    pub callback_url: Option<String>,
    /// Reconciliation sweep cadence
    pub sweep_interval: Duration,
    /// How long a `submitted` clip may go without news before the
    /// sweeper re-polls it
    pub stale_after: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            sweep_interval: Duration::from_secs(600),
            stale_after: Duration::from_secs(1800),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            callback_url: std::env::var("PROVIDER_CALLBACK_URL").ok(),
            sweep_interval: Duration::from_secs(
                std::env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            stale_after: Duration::from_secs(
                std::env::var("CLIP_STALE_AFTER_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
        }
    }
}

/// The orchestration engine. Cheap to clone; all capabilities are
/// shared behind `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) gateway: Arc<dyn VideoGateway>,
    pub(crate) assets: Arc<dyn AssetStore>,
    pub(crate) ledger: Arc<dyn CreditLedger>,
    pub(crate) stitcher: Arc<dyn StitchTrigger>,
    pub(crate) media: Arc<dyn MediaOps>,
    pub(crate) config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<dyn VideoGateway>,
        assets: Arc<dyn AssetStore>,
        ledger: Arc<dyn CreditLedger>,
        stitcher: Arc<dyn StitchTrigger>,
        media: Arc<dyn MediaOps>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            assets,
            ledger,
            stitcher,
            media,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
