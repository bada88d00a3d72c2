use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Letter tier, `A` safest. The derived `Ord` is the tier order used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    A,
    B,
    C,
    D,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [RiskTier::A, RiskTier::B, RiskTier::C, RiskTier::D];

    /// Position in the total order (A=0 .. D=3).
    pub fn rank(self) -> u8 {
        match self {
            RiskTier::A => 0,
            RiskTier::B => 1,
            RiskTier::C => 2,
            RiskTier::D => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::A => "A",
            RiskTier::B => "B",
            RiskTier::C => "C",
            RiskTier::D => "D",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RiskTier::A),
            "B" => Ok(RiskTier::B),
            "C" => Ok(RiskTier::C),
            "D" => Ok(RiskTier::D),
            other => anyhow::bail!("unknown risk tier: {other:?}"),
        }
    }
}

/// A single yield-bearing pool available for allocation.
///
/// Accepts DefiLlama's camelCase field names as aliases. `risk_score` and `risk_tier` are
/// never read from input; they are filled in by [`crate::risk::scorer::annotate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub chain: String,
    pub project: String,
    pub symbol: String,

    #[serde(default, alias = "pool")]
    pub pool_id: Option<String>,
    #[serde(default, alias = "tvlUsd")]
    pub tvl_usd: Option<f64>,

    #[serde(default)]
    pub apy: Option<f64>,
    #[serde(default, alias = "apyBase")]
    pub apy_base: Option<f64>,
    #[serde(default, alias = "apyReward")]
    pub apy_reward: Option<f64>,
    #[serde(default, alias = "apyMean30d")]
    pub apy_mean_30d: Option<f64>,
    #[serde(default, alias = "apyPct7D")]
    pub apy_pct_7d: Option<f64>,

    #[serde(default)]
    pub exposure: Option<String>,
    #[serde(default, alias = "ilRisk")]
    pub il_risk: Option<String>,
    #[serde(default)]
    pub stablecoin: Option<bool>,

    #[serde(default, alias = "predictedClass")]
    pub predicted_class: Option<String>,
    #[serde(default, alias = "predictedProbability")]
    pub predicted_probability: Option<f64>,

    #[serde(skip_deserializing)]
    pub risk_score: Option<f64>,
    #[serde(skip_deserializing)]
    pub risk_tier: Option<RiskTier>,
}

impl Opportunity {
    pub fn new(
        chain: impl Into<String>,
        project: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            chain: chain.into(),
            project: project.into(),
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// `"{project}-{symbol}"`, the key advisory payloads use when no pool id is given.
    pub fn combined_key(&self) -> String {
        format!("{}-{}", self.project, self.symbol)
    }

    pub fn has_il_risk(&self) -> bool {
        self.il_risk
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("yes"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskMetric {
    pub tier: RiskTier,
    pub count: usize,
    /// Rounded independently per tier, so the four values may not sum to exactly 100.
    pub percentage: u32,
}

/// Portfolio-level grade derived from the tier mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskGrade {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl RiskGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskGrade::A => "A",
            RiskGrade::BPlus => "B+",
            RiskGrade::B => "B",
            RiskGrade::BMinus => "B-",
            RiskGrade::C => "C",
            RiskGrade::CMinus => "C-",
            RiskGrade::NotAvailable => "N/A",
        }
    }
}

impl fmt::Display for RiskGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDistribution {
    /// Always A, B, C, D in that order.
    pub distribution: [RiskMetric; 4],
    pub grade: RiskGrade,
    pub total: usize,
}

impl RiskDistribution {
    pub fn metric(&self, tier: RiskTier) -> &RiskMetric {
        &self.distribution[tier.rank() as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tier_order_is_a_safest() {
        assert!(RiskTier::A < RiskTier::B);
        assert!(RiskTier::C < RiskTier::D);
        assert_eq!(RiskTier::D.rank(), 3);
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!(" b ".parse::<RiskTier>().unwrap(), RiskTier::B);
        assert_eq!("d".parse::<RiskTier>().unwrap(), RiskTier::D);
        assert!("E".parse::<RiskTier>().is_err());
        assert!("".parse::<RiskTier>().is_err());
    }

    #[test]
    fn deserializes_defillama_field_names() {
        let v = json!({
            "chain": "Ethereum",
            "project": "aave-v3",
            "symbol": "USDC",
            "pool": "aa70268e",
            "tvlUsd": 12_000_000.0,
            "apy": 4.2,
            "apyBase": 3.9,
            "apyMean30d": 4.0,
            "apyPct7D": -0.3,
            "ilRisk": "no",
            "exposure": "single",
            "stablecoin": true,
            "predictedClass": "Stable/Up",
            "predictedProbability": 77.0,
            "risk_tier": "A",
            "risk_score": 9.0
        });

        let opp: Opportunity = serde_json::from_value(v).unwrap();
        assert_eq!(opp.pool_id.as_deref(), Some("aa70268e"));
        assert_eq!(opp.tvl_usd, Some(12_000_000.0));
        assert_eq!(opp.apy_pct_7d, Some(-0.3));
        assert_eq!(opp.predicted_probability, Some(77.0));
        assert_eq!(opp.apy_reward, None);
        // Derived fields are computed, never supplied.
        assert_eq!(opp.risk_tier, None);
        assert_eq!(opp.risk_score, None);
    }

    #[test]
    fn grade_serializes_with_symbols() {
        assert_eq!(serde_json::to_value(RiskGrade::BPlus).unwrap(), json!("B+"));
        assert_eq!(serde_json::to_value(RiskGrade::NotAvailable).unwrap(), json!("N/A"));
    }

    #[test]
    fn il_risk_flag_is_case_insensitive() {
        let mut opp = Opportunity::new("Ethereum", "Curve", "3pool");
        assert!(!opp.has_il_risk());
        opp.il_risk = Some("YES".to_string());
        assert!(opp.has_il_risk());
        assert_eq!(opp.combined_key(), "Curve-3pool");
    }
}
