use crate::config::Settings;
use crate::domain::opportunity::Opportunity;
use crate::ingest::{with_retries, OpportunitySource};
use crate::risk;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_POOL_LIMIT: u32 = 200;
const DEFAULT_FEE_BP: f64 = 30.0;

pub const STELLAR_CHAIN: &str = "Stellar";
pub const STELLAR_DEX_PROJECT: &str = "Stellar DEX";

const STABLE_CODES: [&str; 2] = ["USDC", "USDT"];

/// `GET /liquidity_pools` page (HAL).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiquidityPoolsPage {
    #[serde(default, rename = "_embedded")]
    pub embedded: Embedded,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embedded {
    #[serde(default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HorizonPool {
    pub id: String,
    #[serde(default)]
    pub fee_bp: Option<f64>,
    #[serde(default)]
    pub reserves: Vec<Reserve>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reserve {
    /// `native` for XLM, otherwise `CODE:ISSUER`.
    pub asset: String,
}

impl Reserve {
    pub fn code(&self) -> &str {
        if self.asset.starts_with("native") {
            return "XLM";
        }
        self.asset.split(':').next().unwrap_or_default()
    }
}

impl HorizonPool {
    /// Horizon reports no TVL or APY; the fee tier stands in for yield (`fee_bp / 100`) and
    /// TVL stays unknown. Pools with fewer than two reserves yield `None`.
    pub fn into_opportunity(self) -> Option<Opportunity> {
        if self.reserves.len() < 2 {
            return None;
        }
        let codes: Vec<&str> = self.reserves.iter().map(Reserve::code).collect();
        let multi = codes.len() > 1;
        let stablecoin = codes.iter().any(|c| STABLE_CODES.contains(c));
        let apy = self.fee_bp.unwrap_or(DEFAULT_FEE_BP) / 100.0;

        let mut opp = Opportunity::new(STELLAR_CHAIN, STELLAR_DEX_PROJECT, codes.join("/"));
        opp.pool_id = Some(self.id);
        opp.apy = Some(apy);
        opp.apy_base = Some(apy);
        opp.exposure = Some(if multi { "multi" } else { "single" }.to_string());
        opp.il_risk = Some(if multi { "yes" } else { "no" }.to_string());
        opp.stablecoin = Some(stablecoin);
        Some(opp)
    }
}

/// Native Stellar DEX liquidity pools from a Horizon server.
#[derive(Debug, Clone)]
pub struct StellarHorizonSource {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    limit: u32,
}

impl StellarHorizonSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout_secs = std::env::var("STELLAR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("STELLAR_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RETRIES);

        let limit = std::env::var("STELLAR_POOL_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_POOL_LIMIT);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build Horizon http client")?;

        Ok(Self {
            http,
            base_url: settings.horizon_base_url().to_string(),
            retries,
            limit,
        })
    }

    fn url(&self) -> String {
        format!("{}/liquidity_pools", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_once(&self) -> Result<LiquidityPoolsPage> {
        let res = self
            .http
            .get(self.url())
            .query(&[("limit", self.limit.to_string()), ("order", "desc".to_string())])
            .send()
            .await
            .context("Horizon request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read Horizon response")?;
        if !status.is_success() {
            let preview: String = text.chars().take(200).collect();
            anyhow::bail!("Horizon HTTP {status}: {preview}");
        }

        serde_json::from_str::<LiquidityPoolsPage>(&text)
            .context("failed to parse Horizon liquidity_pools page")
    }
}

/// True when `chains` is empty or names Stellar.
pub fn wants_stellar(chains: Option<&[String]>) -> bool {
    match chains {
        None => true,
        Some(chains) if chains.is_empty() => true,
        Some(chains) => chains
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(STELLAR_CHAIN)),
    }
}

#[async_trait::async_trait]
impl OpportunitySource for StellarHorizonSource {
    fn source_name(&self) -> &'static str {
        "stellar-horizon"
    }

    async fn fetch_opportunities(&self, chains: Option<&[String]>) -> Result<Vec<Opportunity>> {
        if !wants_stellar(chains) {
            tracing::debug!(chains = ?chains, "Stellar not requested; skipping Horizon");
            return Ok(Vec::new());
        }

        let page = with_retries(self.source_name(), self.retries, || self.fetch_once()).await?;
        let fetched = page.embedded.records.len();
        let opportunities = parse_liquidity_pools(page.embedded.records);
        tracing::info!(fetched, parsed = opportunities.len(), "Stellar liquidity pools loaded");
        Ok(opportunities)
    }
}

/// Decodes and scores raw Horizon pool records, skipping undecodable ones.
pub fn parse_liquidity_pools(records: Vec<Value>) -> Vec<Opportunity> {
    let mut out = Vec::with_capacity(records.len());
    for (index, raw) in records.into_iter().enumerate() {
        match serde_json::from_value::<HorizonPool>(raw) {
            Ok(pool) => {
                if let Some(opp) = pool.into_opportunity() {
                    out.push(risk::annotate(opp));
                }
            }
            Err(err) => {
                tracing::warn!(index, error = %err, "failed to parse Horizon pool; skipping");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USDC: &str = "USDC:GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";
    const AQUA: &str = "AQUA:GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";

    #[test]
    fn maps_reserves_onto_symbol_and_risk_flags() {
        let records = vec![
            json!({
                "id": "pool-a",
                "fee_bp": 30,
                "total_shares": "5000.0000000",
                "reserves": [{"asset": "native", "amount": "100.0"}, {"asset": USDC, "amount": "12.5"}]
            }),
            json!({
                "id": "pool-b",
                "reserves": [{"asset": AQUA, "amount": "1"}, {"asset": "native", "amount": "2"}]
            }),
        ];

        let out = parse_liquidity_pools(records);
        assert_eq!(out.len(), 2);

        let a = &out[0];
        assert_eq!(a.chain, "Stellar");
        assert_eq!(a.project, "Stellar DEX");
        assert_eq!(a.symbol, "XLM/USDC");
        assert_eq!(a.pool_id.as_deref(), Some("pool-a"));
        assert_eq!(a.apy, Some(0.3));
        assert_eq!(a.apy_base, Some(0.3));
        assert_eq!(a.tvl_usd, None);
        assert_eq!(a.exposure.as_deref(), Some("multi"));
        assert!(a.has_il_risk());
        assert_eq!(a.stablecoin, Some(true));
        assert!(a.risk_tier.is_some());

        let b = &out[1];
        assert_eq!(b.symbol, "AQUA/XLM");
        assert_eq!(b.stablecoin, Some(false));
        // Missing fee tier falls back to 30bp.
        assert_eq!(b.apy, Some(0.3));
    }

    #[test]
    fn skips_single_reserve_and_malformed_records() {
        let records = vec![
            json!({"id": "lonely", "fee_bp": 30, "reserves": [{"asset": "native"}]}),
            json!({"fee_bp": 30, "reserves": "nope"}),
            json!({"id": "ok", "fee_bp": 10, "reserves": [{"asset": USDC}, {"asset": "USDT:GISSUER"}]}),
        ];
        let out = parse_liquidity_pools(records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol, "USDC/USDT");
        assert_eq!(out[0].apy, Some(0.1));
        assert_eq!(out[0].stablecoin, Some(true));
    }

    #[test]
    fn page_reads_embedded_records() {
        let page: LiquidityPoolsPage = serde_json::from_value(json!({
            "_links": {"self": {"href": "x"}},
            "_embedded": {"records": [{"id": "p"}]}
        }))
        .unwrap();
        assert_eq!(page.embedded.records.len(), 1);

        let empty: LiquidityPoolsPage = serde_json::from_value(json!({})).unwrap();
        assert!(empty.embedded.records.is_empty());
    }

    #[test]
    fn stellar_is_wanted_for_all_chains_or_by_name() {
        assert!(wants_stellar(None));
        assert!(wants_stellar(Some(&[])));
        assert!(wants_stellar(Some(&["Ethereum".to_string(), " stellar".to_string()])));
        assert!(!wants_stellar(Some(&["Ethereum".to_string()])));
    }
}
