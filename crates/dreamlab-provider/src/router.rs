//! Provider selection and the unified submission surface.

use metrics::counter;
use tracing::{error, info};

use dreamlab_models::{CastKind, PendingSubmission, Provider, ProviderLimits, RoutingStrategy};

use crate::breaker::ProviderBreaker;
use crate::error::{ProviderError, ProviderResult};
use crate::kling::KlingClient;
use crate::seedance::{SeedanceClient, SeedanceConfig};
use crate::types::{SubmittedTask, TaskStatus};

/// Pick the provider for one clip.
///
/// Precedence: cast policy first (Seedance blocks photorealistic human
/// faces), then the job-level strategy. Hybrid sends dialogue to Kling
/// and silent B-roll to Seedance. Any Seedance choice falls back to
/// Kling when Seedance is not configured.
pub fn select_clip_provider(
    strategy: RoutingStrategy,
    cast: CastKind,
    has_dialogue: bool,
    seedance_configured: bool,
) -> Provider {
    if !cast.seedance_eligible() {
        return Provider::Kling;
    }

    match strategy {
        RoutingStrategy::Kling => Provider::Kling,
        RoutingStrategy::Seedance if seedance_configured => Provider::Seedance,
        RoutingStrategy::Seedance => Provider::Kling,
        RoutingStrategy::Hybrid => {
            if has_dialogue || !seedance_configured {
                Provider::Kling
            } else {
                Provider::Seedance
            }
        }
    }
}

/// Routes submissions and polls to the right provider client, guarding
/// each with the quota breaker.
pub struct ProviderRouter {
    kling: KlingClient,
    seedance: Option<SeedanceClient>,
    breaker: ProviderBreaker,
    limits: ProviderLimits,
}

impl ProviderRouter {
    pub fn new(
        kling: KlingClient,
        seedance: Option<SeedanceClient>,
        limits: ProviderLimits,
    ) -> Self {
        Self {
            kling,
            seedance,
            breaker: ProviderBreaker::new(),
            limits,
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let kling = KlingClient::from_env()?;
        let seedance = match SeedanceConfig::from_env() {
            Some(config) => Some(SeedanceClient::new(config)?),
            None => None,
        };
        Ok(Self::new(kling, seedance, ProviderLimits::default()))
    }

    pub fn limits(&self) -> &ProviderLimits {
        &self.limits
    }

    pub fn seedance_configured(&self) -> bool {
        self.seedance.is_some()
    }

    /// Route one clip.
    pub fn select(&self, strategy: RoutingStrategy, cast: CastKind, has_dialogue: bool) -> Provider {
        select_clip_provider(strategy, cast, has_dialogue, self.seedance_configured())
    }

    /// Submit to a provider. A quota failure blocks the provider before
    /// surfacing, so later submissions fail fast on the breaker.
    pub async fn submit(
        &self,
        provider: Provider,
        submission: &PendingSubmission,
    ) -> ProviderResult<SubmittedTask> {
        if !self.breaker.is_available(provider) {
            counter!("provider_submissions_total",
                "provider" => provider.as_str(), "outcome" => "blocked")
            .increment(1);
            return Err(ProviderError::Unavailable(provider));
        }

        let result = match provider {
            Provider::Kling => self.kling.submit(submission, &self.limits).await,
            Provider::Seedance => match &self.seedance {
                Some(client) => client.submit(submission, &self.limits).await,
                None => Err(ProviderError::Unavailable(Provider::Seedance)),
            },
        };

        match result {
            Ok(task_id) => {
                info!(provider = %provider, task_id = %task_id, "submission accepted");
                counter!("provider_submissions_total",
                    "provider" => provider.as_str(), "outcome" => "accepted")
                .increment(1);
                Ok(SubmittedTask { provider, task_id })
            }
            Err(e) => {
                if e.is_quota() {
                    error!(provider = %provider, "quota exhausted, blocking provider: {}", e);
                    self.breaker.block(provider);
                }
                counter!("provider_submissions_total",
                    "provider" => provider.as_str(), "outcome" => "failed")
                .increment(1);
                Err(e)
            }
        }
    }

    /// Poll the authoritative task status.
    pub async fn poll(&self, provider: Provider, task_id: &str) -> ProviderResult<TaskStatus> {
        match provider {
            Provider::Kling => self.kling.poll(task_id).await,
            Provider::Seedance => match &self.seedance {
                Some(client) => client.poll(task_id).await,
                None => Err(ProviderError::Unavailable(Provider::Seedance)),
            },
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_cast_always_routes_to_kling() {
        for strategy in [RoutingStrategy::Kling, RoutingStrategy::Seedance, RoutingStrategy::Hybrid] {
            assert_eq!(
                select_clip_provider(strategy, CastKind::Human, false, true),
                Provider::Kling
            );
        }
    }

    #[test]
    fn hybrid_splits_on_dialogue() {
        assert_eq!(
            select_clip_provider(RoutingStrategy::Hybrid, CastKind::Virtual, true, true),
            Provider::Kling
        );
        assert_eq!(
            select_clip_provider(RoutingStrategy::Hybrid, CastKind::Virtual, false, true),
            Provider::Seedance
        );
    }

    #[tokio::test]
    async fn quota_failure_blocks_subsequent_submissions() {
        use crate::kling::KlingConfig;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos/image2video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 1600039, "message": "Insufficient balance"
            })))
            .mount(&server)
            .await;

        let kling = KlingClient::new(KlingConfig {
            base_url: server.uri(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
        })
        .unwrap();
        let router = ProviderRouter::new(kling, None, ProviderLimits::default());
        let submission = PendingSubmission::single_shot("a scene", 5.0);

        let first = router.submit(Provider::Kling, &submission).await.unwrap_err();
        assert!(first.is_quota());

        // breaker now rejects before any network call
        let second = router.submit(Provider::Kling, &submission).await.unwrap_err();
        assert!(matches!(second, ProviderError::Unavailable(Provider::Kling)));
    }

    #[test]
    fn seedance_choices_fall_back_when_unconfigured() {
        assert_eq!(
            select_clip_provider(RoutingStrategy::Seedance, CastKind::Virtual, false, false),
            Provider::Kling
        );
        assert_eq!(
            select_clip_provider(RoutingStrategy::Hybrid, CastKind::Virtual, false, false),
            Provider::Kling
        );
    }
}
