pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod risk;
pub mod selection;

pub use error::EngineError;

pub mod config {
    use crate::domain::opportunity::RiskTier;
    use crate::selection::rank::RankingStrategy;
    use anyhow::Context;

    pub const DEFAULT_RANKING_STRATEGY: RankingStrategy = RankingStrategy::RiskAdjusted;
    pub const DEFAULT_RISK_GRADE: &str = "B";
    pub const DEFAULT_ALLOCATION_RISK_TIER: RiskTier = RiskTier::B;
    pub const DEFAULT_MIN_LIQUIDITY_USD: f64 = 50_000.0;
    pub const DEFAULT_MAX_OPPORTUNITIES: usize = 20;
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

    pub const DEFAULT_DEFILLAMA_BASE_URL: &str = "https://yields.llama.fi";
    pub const DEFAULT_HORIZON_BASE_URL: &str = "https://horizon.stellar.org";
    pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:3001";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub gemini_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub defillama_base_url: Option<String>,
        pub horizon_base_url: Option<String>,
        pub cors_origins: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                gemini_api_key: std::env::var("GEMINI_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                defillama_base_url: std::env::var("DEFILLAMA_BASE_URL").ok(),
                horizon_base_url: std::env::var("STELLAR_HORIZON_URL").ok(),
                cors_origins: std::env::var("CORS_ORIGINS").ok(),
            })
        }

        pub fn require_gemini_api_key(&self) -> anyhow::Result<&str> {
            self.gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }

        pub fn defillama_base_url(&self) -> &str {
            self.defillama_base_url
                .as_deref()
                .unwrap_or(DEFAULT_DEFILLAMA_BASE_URL)
        }

        pub fn horizon_base_url(&self) -> &str {
            self.horizon_base_url
                .as_deref()
                .unwrap_or(DEFAULT_HORIZON_BASE_URL)
        }

        pub fn cors_origins(&self) -> Vec<String> {
            self.cors_origins
                .as_deref()
                .unwrap_or(DEFAULT_CORS_ORIGINS)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
    }

    /// Values the engine falls back to when a request leaves them out.
    #[derive(Debug, Clone, PartialEq)]
    pub struct EngineDefaults {
        pub ranking_strategy: RankingStrategy,
        pub risk_grade: String,
        pub allocation_risk_tier: RiskTier,
        pub min_liquidity_usd: f64,
        pub max_opportunities: usize,
        pub cache_ttl_secs: u64,
    }

    impl Default for EngineDefaults {
        fn default() -> Self {
            Self {
                ranking_strategy: DEFAULT_RANKING_STRATEGY,
                risk_grade: DEFAULT_RISK_GRADE.to_string(),
                allocation_risk_tier: DEFAULT_ALLOCATION_RISK_TIER,
                min_liquidity_usd: DEFAULT_MIN_LIQUIDITY_USD,
                max_opportunities: DEFAULT_MAX_OPPORTUNITIES,
                cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            }
        }
    }

    impl EngineDefaults {
        pub fn from_env() -> Self {
            let defaults = Self::default();
            Self {
                ranking_strategy: std::env::var("ENGINE_DEFAULT_STRATEGY")
                    .ok()
                    .map(|s| RankingStrategy::from_name(&s))
                    .unwrap_or(defaults.ranking_strategy),
                risk_grade: std::env::var("ENGINE_DEFAULT_RISK_GRADE")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(defaults.risk_grade),
                allocation_risk_tier: defaults.allocation_risk_tier,
                min_liquidity_usd: std::env::var("ENGINE_MIN_LIQUIDITY_USD")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(defaults.min_liquidity_usd),
                max_opportunities: std::env::var("ENGINE_MAX_OPPORTUNITIES")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.max_opportunities),
                cache_ttl_secs: std::env::var("ENGINE_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(defaults.cache_ttl_secs),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn cors_origins_split_and_trimmed() {
            let settings = Settings {
                gemini_api_key: None,
                sentry_dsn: None,
                defillama_base_url: None,
                horizon_base_url: Some("http://localhost:8001".to_string()),
                cors_origins: Some(" https://a.example , ,https://b.example".to_string()),
            };
            assert_eq!(
                settings.cors_origins(),
                vec!["https://a.example".to_string(), "https://b.example".to_string()]
            );
            assert_eq!(settings.defillama_base_url(), DEFAULT_DEFILLAMA_BASE_URL);
            assert_eq!(settings.horizon_base_url(), "http://localhost:8001");
            assert!(settings.require_gemini_api_key().is_err());
        }

        #[test]
        fn engine_defaults_are_named_constants() {
            let d = EngineDefaults::default();
            assert_eq!(d.ranking_strategy, RankingStrategy::RiskAdjusted);
            assert_eq!(d.risk_grade, "B");
            assert_eq!(d.allocation_risk_tier, RiskTier::B);
            assert_eq!(d.max_opportunities, 20);
        }
    }
}
