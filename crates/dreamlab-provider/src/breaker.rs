//! In-process provider availability tracker.
//!
//! When a provider reports its account out of quota, it is blocked for
//! a cooldown window so subsequent clips fail fast instead of burning
//! attempts. State is in-memory only and resets on restart.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use dreamlab_models::Provider;

/// Default cooldown after a quota error.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Tracks which providers are temporarily blocked.
#[derive(Debug, Default)]
pub struct ProviderBreaker {
    blocked_until: RwLock<HashMap<Provider, Instant>>,
}

impl ProviderBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the provider may receive submissions. An expired block
    /// is cleared on the way out.
    pub fn is_available(&self, provider: Provider) -> bool {
        {
            let blocked = match self.blocked_until.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match blocked.get(&provider) {
                None => return true,
                Some(until) if Instant::now() < *until => return false,
                Some(_) => {}
            }
        }

        let mut blocked = match self.blocked_until.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        blocked.remove(&provider);
        info!(provider = %provider, "provider unblocked");
        true
    }

    /// Block a provider for the default cooldown.
    pub fn block(&self, provider: Provider) {
        self.block_for(provider, DEFAULT_BLOCK_DURATION);
    }

    /// Block a provider for a custom duration.
    pub fn block_for(&self, provider: Provider, duration: Duration) {
        let until = Instant::now() + duration;
        let mut blocked = match self.blocked_until.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        blocked.insert(provider, until);
        warn!(
            provider = %provider,
            duration_min = duration.as_secs() / 60,
            "provider blocked"
        );
        metrics::counter!("provider_quota_blocks_total", "provider" => provider.as_str())
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblocked_by_default() {
        let breaker = ProviderBreaker::new();
        assert!(breaker.is_available(Provider::Kling));
        assert!(breaker.is_available(Provider::Seedance));
    }

    #[test]
    fn block_is_per_provider() {
        let breaker = ProviderBreaker::new();
        breaker.block(Provider::Kling);
        assert!(!breaker.is_available(Provider::Kling));
        assert!(breaker.is_available(Provider::Seedance));
    }

    #[test]
    fn expired_block_clears() {
        let breaker = ProviderBreaker::new();
        breaker.block_for(Provider::Kling, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.is_available(Provider::Kling));
        // second read goes through the fast path
        assert!(breaker.is_available(Provider::Kling));
    }
}
