use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One allocation entry of a normalised advisory payload. Field names are canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryAllocation {
    pub pool_id: String,
    pub project: String,
    pub symbol: String,
    pub chain: Option<String>,
    pub allocation_percentage: f64,
    pub allocation_usd: f64,
    pub expected_apy: f64,
    /// Kept as the advisory service wrote it; the reconciler parses it.
    pub risk_tier: Option<String>,
    pub reasoning: String,
}

/// Advisory payload after normalisation: canonical names only, aggregates filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryPayload {
    pub allocations: Vec<AdvisoryAllocation>,
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
}

/// The payload did not fully match the expected shape; a default was used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaWarning {
    pub field: String,
    pub detail: String,
}

impl SchemaWarning {
    pub fn new(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema: {}: {}", self.field, self.detail)
    }
}
