//! Provider error types.
//!
//! Submission failures split three ways and the pipeline treats each
//! differently:
//! - `QuotaExhausted` blocks the provider account-wide and fails the
//!   clip immediately
//! - `Rejected` fails the clip, provider stays available
//! - `Transient` covers the network layer and is the only retryable
//!   class

use thiserror::Error;

use dreamlab_models::Provider;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur during provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{provider} quota exhausted (code {code}): {message}")]
    QuotaExhausted {
        provider: Provider,
        code: i64,
        message: String,
    },

    #[error("{provider} rejected submission (code {code}): {message}")]
    Rejected {
        provider: Provider,
        code: i64,
        message: String,
    },

    #[error("Provider {0} is unavailable")]
    Unavailable(Provider),

    #[error("{provider} returned no task id")]
    NoTaskId { provider: Provider },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Only network-layer failures are worth another attempt; business
    /// errors from the provider never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::Transient(_))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, ProviderError::QuotaExhausted { .. })
    }
}
