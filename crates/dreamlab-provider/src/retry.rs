//! Network-level retry for provider calls.
//!
//! Business errors coming back as JSON are final; only transport
//! failures (resets, timeouts) get another attempt.

use std::time::Duration;

use tracing::warn;

use crate::error::{ProviderError, ProviderResult};

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY_MS: u64 = 1000;

pub async fn with_network_retry<T, F, Fut>(operation: &str, op: F) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ProviderResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS - 1 => {
                let delay = Duration::from_millis(BASE_DELAY_MS.saturating_mul(2u64.pow(attempt)));
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "provider call failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| ProviderError::transient("Unknown error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamlab_models::Provider;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn business_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = with_network_retry("submit", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Rejected {
                    provider: Provider::Kling,
                    code: 1201,
                    message: "bad prompt".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_is_retried_to_exhaustion() {
        let calls = AtomicU32::new(0);
        tokio::time::pause();

        let fut = with_network_retry("submit", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProviderError::transient("connection reset")) }
        });
        let result = fut.await;

        assert!(matches!(result, Err(ProviderError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
