use crate::domain::opportunity::{Opportunity, RiskDistribution, RiskTier};
use crate::selection::rank::RankingStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller's appetite for risk, mapped onto the worst tier it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskTolerance {
    /// Unrecognised names are treated as `Medium`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" | "conservative" => RiskTolerance::Low,
            "high" | "aggressive" => RiskTolerance::High,
            _ => RiskTolerance::Medium,
        }
    }

    pub fn max_tier(self) -> RiskTier {
        match self {
            RiskTolerance::Low => RiskTier::A,
            RiskTolerance::Medium => RiskTier::B,
            RiskTolerance::High => RiskTier::C,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTolerance::Low => "low",
            RiskTolerance::Medium => "medium",
            RiskTolerance::High => "high",
        }
    }
}

impl From<String> for RiskTolerance {
    fn from(s: String) -> Self {
        Self::from_name(&s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub amount_usd: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    #[serde(default)]
    pub preferred_chains: Option<Vec<String>>,
    #[serde(default)]
    pub min_liquidity_usd: Option<f64>,
    #[serde(default)]
    pub min_apy: Option<f64>,
    #[serde(default)]
    pub max_opportunities: Option<usize>,
    #[serde(default)]
    pub ranking_strategy: Option<RankingStrategy>,
}

impl RecommendationRequest {
    pub fn new(amount_usd: f64) -> Self {
        Self {
            amount_usd,
            risk_tolerance: RiskTolerance::default(),
            preferred_chains: None,
            min_liquidity_usd: None,
            min_apy: None,
            max_opportunities: None,
            ranking_strategy: None,
        }
    }
}

/// Owned form of a reconciled allocation, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub opportunity: Opportunity,
    pub allocation_percentage: f64,
    pub allocation_usd: f64,
    pub expected_apy: f64,
    pub risk_tier: RiskTier,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: uuid::Uuid,

    pub requested_amount_usd: f64,
    pub risk_tolerance: RiskTolerance,
    pub preferred_chains: Option<Vec<String>>,
    pub min_liquidity_usd: Option<f64>,
    pub ranking_strategy: RankingStrategy,

    pub allocations: Vec<PortfolioAllocation>,

    pub total_allocated_usd: f64,
    pub weighted_expected_apy: f64,
    pub overall_risk_grade: String,
    pub diversification_score: f64,

    pub summary: String,
    pub key_risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub rationale: String,

    pub projected_returns: BTreeMap<String, f64>,
    pub estimated_fees: BTreeMap<String, f64>,
    pub confidence_score: f64,

    /// Distribution over the ranked candidates that were shown to the advisory service.
    pub risk_distribution: RiskDistribution,
    /// Unmatched allocations and schema mismatches encountered along the way.
    pub warnings: Vec<String>,

    pub generated_at: DateTime<Utc>,
    pub data_freshness_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub success: bool,
    pub recommendation: Option<Recommendation>,
    pub error: Option<String>,
    pub execution_time_ms: f64,
}

impl RecommendationResponse {
    pub fn success(recommendation: Recommendation, execution_time_ms: f64) -> Self {
        Self {
            success: true,
            recommendation: Some(recommendation),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failure(error: impl Into<String>, execution_time_ms: f64) -> Self {
        Self {
            success: false,
            recommendation: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}

/// Ranked top-N without an advisory call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedOpportunities {
    pub strategy: RankingStrategy,
    pub fetched: usize,
    pub filtered: usize,
    pub opportunities: Vec<Opportunity>,
    pub risk_distribution: RiskDistribution,
    pub data_freshness_seconds: u64,
}
