use crate::config::Settings;
use crate::domain::opportunity::Opportunity;
use crate::ingest::types::{LlamaPool, PoolsResponse};
use crate::ingest::{with_retries, OpportunitySource};
use crate::risk;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const POOLS_PATH: &str = "/pools";

#[derive(Debug, Clone)]
pub struct DefiLlamaSource {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl DefiLlamaSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.defillama_base_url().to_string();

        let timeout_secs = std::env::var("DEFILLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DEFILLAMA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RETRIES);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build DefiLlama http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), POOLS_PATH)
    }

    async fn fetch_once(&self) -> Result<PoolsResponse> {
        let res = self
            .http
            .get(self.url())
            .send()
            .await
            .context("DefiLlama request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read DefiLlama response")?;

        if !status.is_success() {
            let preview: String = text.chars().take(200).collect();
            anyhow::bail!("DefiLlama HTTP {status}: {preview}");
        }

        serde_json::from_str::<PoolsResponse>(&text)
            .context("failed to parse DefiLlama response into PoolsResponse")
    }
}

#[async_trait::async_trait]
impl OpportunitySource for DefiLlamaSource {
    fn source_name(&self) -> &'static str {
        "defillama"
    }

    async fn fetch_opportunities(&self, chains: Option<&[String]>) -> Result<Vec<Opportunity>> {
        let resp = with_retries(self.source_name(), self.retries, || self.fetch_once()).await?;

        let fetched = resp.data.len();
        let opportunities = parse_pools(resp.data, chains);
        tracing::info!(
            status = resp.status.as_deref().unwrap_or("unknown"),
            fetched,
            parsed = opportunities.len(),
            chains = ?chains,
            "DefiLlama pools loaded"
        );
        Ok(opportunities)
    }
}

/// Decodes, chain-filters and scores raw pool entries. Undecodable entries are logged and
/// skipped.
pub fn parse_pools(pools: Vec<Value>, chains: Option<&[String]>) -> Vec<Opportunity> {
    let chains: Option<Vec<String>> = chains
        .filter(|c| !c.is_empty())
        .map(|c| c.iter().map(|s| s.trim().to_lowercase()).collect());

    let mut out = Vec::with_capacity(pools.len());
    for (index, raw) in pools.into_iter().enumerate() {
        let pool = match serde_json::from_value::<LlamaPool>(raw) {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(index, error = %err, "failed to parse DefiLlama pool; skipping");
                continue;
            }
        };

        if let Some(chains) = &chains {
            if !chains.contains(&pool.chain.to_lowercase()) {
                continue;
            }
        }

        if let Some(opp) = pool.into_opportunity() {
            out.push(risk::annotate(opp));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::opportunity::RiskTier;
    use serde_json::json;

    fn pools() -> Vec<Value> {
        vec![
            json!({
                "chain": "Ethereum", "project": "aave-v3", "symbol": "USDC", "pool": "p1",
                "tvlUsd": 1.0e8, "apy": 4.0, "ilRisk": "no", "stablecoin": true,
                "predictions": {"predictedClass": "Stable/Up", "predictedProbability": 90}
            }),
            json!({
                "chain": "Stellar", "project": "blend", "symbol": "XLM", "pool": "p2",
                "tvlUsd": 2.0e6, "apy": 9.0, "ilRisk": "yes"
            }),
            json!({"chain": "Ethereum", "project": "nothing", "symbol": "X", "apy": 5.0}),
            json!({"chain": 42, "project": "broken"}),
        ]
    }

    #[test]
    fn parses_scores_and_skips_unusable_pools() {
        let out = parse_pools(pools(), None);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].pool_id.as_deref(), Some("p1"));
        assert_eq!(out[0].risk_tier, Some(RiskTier::A));
        assert!(out.iter().all(|o| o.risk_score.is_some()));
    }

    #[test]
    fn chain_filter_is_case_insensitive() {
        let chains = vec!["stellar".to_string()];
        let out = parse_pools(pools(), Some(&chains));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].project, "blend");

        let empty: Vec<String> = Vec::new();
        assert_eq!(parse_pools(pools(), Some(&empty)).len(), 2);
    }
}
