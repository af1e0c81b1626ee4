//! Generation provider identities, per-call limits and routing inputs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External video-generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Character provider; handles photorealistic faces and dialogue
    #[default]
    Kling,
    /// Cheaper scene/B-roll provider; blocks photorealistic human faces
    Seedance,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Kling => "kling",
            Provider::Seedance => "seedance",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-submission ceilings a provider enforces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderLimits {
    /// Maximum shots per multi-shot submission
    pub max_shots: usize,
    /// Maximum cumulative duration per submission, seconds
    pub max_duration_s: f64,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        // Kling multi-shot: 6 shots / 15 s per call
        Self {
            max_shots: 6,
            max_duration_s: 15.0,
        }
    }
}

/// Job-level provider strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Everything on the character provider
    #[default]
    Kling,
    /// Everything on the scene provider (when configured)
    Seedance,
    /// Dialogue beats on Kling, silent B-roll on Seedance
    Hybrid,
}

/// What kind of cast member fronts the job. Seedance refuses
/// photorealistic human faces, so `Human` always routes to Kling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CastKind {
    #[default]
    Human,
    Animal,
    Virtual,
    Brand,
}

impl CastKind {
    pub fn seedance_eligible(&self) -> bool {
        !matches!(self, CastKind::Human)
    }
}
