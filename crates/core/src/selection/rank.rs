use crate::domain::opportunity::Opportunity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum RankingStrategy {
    /// `0.7 * apy + 0.3 * (3 * risk_score)`, descending.
    #[default]
    RiskAdjusted,
    /// APY descending.
    MaxYield,
    /// Tier ascending (unscored last), then APY descending.
    MinRisk,
    /// `apy / max(volatility, 0.1)`, descending.
    Sharpe,
}

impl RankingStrategy {
    /// Lenient parse: unknown names fall back to `RiskAdjusted`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "max_yield" => RankingStrategy::MaxYield,
            "min_risk" => RankingStrategy::MinRisk,
            "sharpe" => RankingStrategy::Sharpe,
            _ => RankingStrategy::RiskAdjusted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RankingStrategy::RiskAdjusted => "risk_adjusted",
            RankingStrategy::MaxYield => "max_yield",
            RankingStrategy::MinRisk => "min_risk",
            RankingStrategy::Sharpe => "sharpe",
        }
    }
}

impl From<String> for RankingStrategy {
    fn from(s: String) -> Self {
        Self::from_name(&s)
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns a new ordering; the input is untouched. Sorting is stable for every strategy,
/// so equal keys keep their input order.
pub fn rank(opportunities: &[Opportunity], strategy: RankingStrategy) -> Vec<Opportunity> {
    let mut out = opportunities.to_vec();
    match strategy {
        RankingStrategy::MaxYield => {
            out.sort_by(|a, b| descending(apy(a), apy(b)));
        }
        RankingStrategy::MinRisk => {
            out.sort_by(|a, b| {
                tier_rank(a)
                    .cmp(&tier_rank(b))
                    .then_with(|| descending(apy(a), apy(b)))
            });
        }
        RankingStrategy::Sharpe => {
            out.sort_by(|a, b| descending(sharpe_score(a), sharpe_score(b)));
        }
        RankingStrategy::RiskAdjusted => {
            out.sort_by(|a, b| descending(risk_adjusted_score(a), risk_adjusted_score(b)));
        }
    }
    out
}

pub fn risk_adjusted_score(opp: &Opportunity) -> f64 {
    let risk_score = opp.risk_score.unwrap_or(0.0);
    apy(opp) * 0.7 + risk_score * 3.0 * 0.3
}

pub fn sharpe_score(opp: &Opportunity) -> f64 {
    // A zero 7d change carries no signal and is treated like a missing one.
    let volatility = match opp.apy_pct_7d {
        Some(pct) if pct != 0.0 => pct.abs(),
        _ => 1.0,
    };
    apy(opp) / volatility.max(0.1)
}

fn apy(opp: &Opportunity) -> f64 {
    opp.apy.unwrap_or(0.0)
}

fn tier_rank(opp: &Opportunity) -> u8 {
    opp.risk_tier.map(|t| t.rank()).unwrap_or(4)
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
