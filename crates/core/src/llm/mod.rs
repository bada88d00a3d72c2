pub mod error;
pub mod gemini;
pub mod json;
pub mod normalize;
pub mod prompt;

use crate::domain::opportunity::{Opportunity, RiskDistribution};
use crate::domain::recommendation::RiskTolerance;
use std::fmt;

/// Everything the advisory service sees about one request.
#[derive(Debug, Clone)]
pub struct AdvisoryInput {
    pub amount_usd: f64,
    pub risk_tolerance: RiskTolerance,
    pub preferred_chains: Option<Vec<String>>,
    pub min_liquidity_usd: Option<f64>,
    pub risk_distribution: RiskDistribution,
    /// Ranked top-N, best first.
    pub opportunities: Vec<Opportunity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Returns the raw advisory payload, decoded to a JSON object but not normalised.
    async fn generate_advice(&self, input: &AdvisoryInput) -> anyhow::Result<serde_json::Value>;
}
