use crate::domain::opportunity::Opportunity;
use serde::Deserialize;
use serde_json::Value;

/// `GET /pools` body. Pools stay raw so one bad entry does not sink the whole response.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlamaPool {
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub tvl_usd: Option<f64>,
    #[serde(default)]
    pub apy: Option<f64>,
    #[serde(default)]
    pub apy_base: Option<f64>,
    #[serde(default)]
    pub apy_reward: Option<f64>,
    #[serde(default)]
    pub apy_mean_30d: Option<f64>,
    #[serde(default, rename = "apyPct7D")]
    pub apy_pct_7d: Option<f64>,
    #[serde(default)]
    pub exposure: Option<String>,
    #[serde(default)]
    pub il_risk: Option<String>,
    #[serde(default)]
    pub stablecoin: Option<bool>,
    #[serde(default)]
    pub predictions: Option<Predictions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predictions {
    #[serde(default)]
    pub predicted_class: Option<String>,
    #[serde(default)]
    pub predicted_probability: Option<f64>,
}

impl LlamaPool {
    /// Pools without TVL or APY are not usable and yield `None`.
    pub fn into_opportunity(self) -> Option<Opportunity> {
        let tvl_usd = self.tvl_usd?;
        let apy = self.apy?;
        let predictions = self.predictions.unwrap_or_default();
        Some(Opportunity {
            chain: self.chain,
            project: self.project,
            symbol: self.symbol,
            pool_id: self.pool,
            tvl_usd: Some(tvl_usd),
            apy: Some(apy),
            apy_base: self.apy_base,
            apy_reward: self.apy_reward,
            apy_mean_30d: self.apy_mean_30d,
            apy_pct_7d: self.apy_pct_7d,
            exposure: self.exposure,
            il_risk: self.il_risk,
            stablecoin: self.stablecoin,
            predicted_class: predictions.predicted_class,
            predicted_probability: predictions.predicted_probability,
            risk_score: None,
            risk_tier: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifts_predictions_onto_opportunity() {
        let pool: LlamaPool = serde_json::from_value(json!({
            "chain": "Ethereum",
            "project": "aave-v3",
            "symbol": "USDC",
            "pool": "aa70268e",
            "tvlUsd": 250000000.0,
            "apy": 4.2,
            "apyBase": 4.2,
            "apyReward": null,
            "apyMean30d": 4.0,
            "apyPct7D": -0.3,
            "exposure": "single",
            "ilRisk": "no",
            "stablecoin": true,
            "predictions": {"predictedClass": "Stable/Up", "predictedProbability": 75, "binnedConfidence": 2}
        }))
        .unwrap();

        let opp = pool.into_opportunity().unwrap();
        assert_eq!(opp.pool_id.as_deref(), Some("aa70268e"));
        assert_eq!(opp.apy_pct_7d, Some(-0.3));
        assert_eq!(opp.apy_mean_30d, Some(4.0));
        assert_eq!(opp.predicted_class.as_deref(), Some("Stable/Up"));
        assert_eq!(opp.predicted_probability, Some(75.0));
        assert_eq!(opp.risk_tier, None);
    }

    #[test]
    fn missing_tvl_or_apy_is_skipped() {
        let no_tvl: LlamaPool = serde_json::from_value(json!({
            "chain": "Ethereum", "project": "x", "symbol": "Y", "apy": 3.0
        }))
        .unwrap();
        assert!(no_tvl.into_opportunity().is_none());

        let no_apy: LlamaPool = serde_json::from_value(json!({
            "chain": "Ethereum", "project": "x", "symbol": "Y", "tvlUsd": 1.0, "apy": null
        }))
        .unwrap();
        assert!(no_apy.into_opportunity().is_none());
    }
}
