//! Credit ledger operations.
//!
//! Debits and refunds go through Postgres functions so the balance
//! check and the ledger write happen in one transaction. Refund
//! reasons are namespaced per cause so a duplicate refund attempt is
//! visible in the ledger.

use serde_json::json;
use tracing::info;

use dreamlab_models::JobId;

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};

/// Ledger reason for a refund after a job failed with no usable clips.
pub fn refund_reason_job_failed(job_id: JobId) -> String {
    format!("refund:job_failed:{job_id}")
}

/// Ledger reason for a refund after a submission never reached the
/// provider.
pub fn refund_reason_submit_failed(job_id: JobId) -> String {
    format!("refund:submit_failed:{job_id}")
}

/// Typed access to the credit ledger RPCs.
#[derive(Clone)]
pub struct CreditsRepo {
    client: StoreClient,
}

impl CreditsRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Debit `amount` credits, failing with `InsufficientCredits` when
    /// the balance does not cover it.
    pub async fn deduct(&self, user_id: &str, amount: u32, reason: &str) -> StoreResult<()> {
        let result: StoreResult<serde_json::Value> = self
            .client
            .rpc(
                "deduct_credits",
                "deduct_credits",
                &json!({
                    "p_user_id": user_id,
                    "p_amount": amount,
                    "p_reason": reason,
                }),
            )
            .await;

        match result {
            Ok(_) => {
                info!(user_id = %user_id, amount, reason = %reason, "credits deducted");
                Ok(())
            }
            Err(StoreError::Conflict(msg)) | Err(StoreError::RequestFailed(msg))
                if msg.to_ascii_lowercase().contains("insufficient") =>
            {
                Err(StoreError::InsufficientCredits {
                    user_id: user_id.to_string(),
                    required: amount,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Credit `amount` back to the user.
    pub async fn add(&self, user_id: &str, amount: u32, reason: &str) -> StoreResult<()> {
        let _: serde_json::Value = self
            .client
            .rpc(
                "add_credits",
                "add_credits",
                &json!({
                    "p_user_id": user_id,
                    "p_amount": amount,
                    "p_reason": reason,
                }),
            )
            .await?;
        info!(user_id = %user_id, amount, reason = %reason, "credits added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{StoreClient, StoreConfig};
    use crate::retry::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(base_url: &str) -> CreditsRepo {
        CreditsRepo::new(
            StoreClient::new(StoreConfig {
                base_url: base_url.to_string(),
                service_key: "k".into(),
                timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(1),
                retry: RetryConfig {
                    max_retries: 0,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
            })
            .unwrap(),
        )
    }

    #[test]
    fn refund_reasons_are_namespaced_per_cause() {
        assert_eq!(refund_reason_job_failed(JobId(42)), "refund:job_failed:42");
        assert_eq!(refund_reason_submit_failed(JobId(42)), "refund:submit_failed:42");
    }

    #[tokio::test]
    async fn deduct_maps_insufficient_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/deduct_credits"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"message":"Insufficient credits"}"#),
            )
            .mount(&server)
            .await;

        let err = repo(&server.uri())
            .deduct("u1", 10, "job:42")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { required: 10, .. }));
    }

    #[tokio::test]
    async fn add_passes_namespaced_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/add_credits"))
            .and(body_partial_json(json!({
                "p_user_id": "u1",
                "p_amount": 10,
                "p_reason": "refund:job_failed:42"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
            .mount(&server)
            .await;

        repo(&server.uri())
            .add("u1", 10, &refund_reason_job_failed(JobId(42)))
            .await
            .unwrap();
    }
}
