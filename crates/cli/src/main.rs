use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yieldagent_core::config::{EngineDefaults, Settings};
use yieldagent_core::domain::recommendation::{
    RecommendationRequest, RecommendationResponse, RiskTolerance,
};
use yieldagent_core::engine::{self, RecommendationEngine};
use yieldagent_core::ingest::CombinedSource;
use yieldagent_core::llm::error::LlmDiagnosticsError;
use yieldagent_core::llm::gemini::GeminiClient;
use yieldagent_core::selection::RankingStrategy;

mod render;

#[derive(Debug, Parser)]
#[command(name = "yieldagent", about = "Risk-scored yield recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the advisory service for a portfolio and reconcile it against live pools.
    Recommend {
        /// Capital to allocate, in USD.
        #[arg(long)]
        amount: f64,

        #[command(flatten)]
        filters: Filters,

        /// Write the full response JSON here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rank live pools without an advisory call.
    Opportunities {
        #[command(flatten)]
        filters: Filters,
    },
}

#[derive(Debug, Clone, Args)]
struct Filters {
    /// low | medium | high
    #[arg(long, default_value = "medium")]
    risk: String,

    #[arg(long, num_args = 1..)]
    chains: Vec<String>,

    #[arg(long)]
    min_liquidity: Option<f64>,

    #[arg(long)]
    min_apy: Option<f64>,

    #[arg(long)]
    max_opportunities: Option<usize>,

    /// risk_adjusted | max_yield | min_risk | sharpe
    #[arg(long)]
    strategy: Option<String>,
}

impl Filters {
    fn into_request(self, amount_usd: f64) -> RecommendationRequest {
        let mut request = RecommendationRequest::new(amount_usd);
        request.risk_tolerance = RiskTolerance::from_name(&self.risk);
        request.preferred_chains = (!self.chains.is_empty()).then_some(self.chains);
        request.min_liquidity_usd = self.min_liquidity;
        request.min_apy = self.min_apy;
        request.max_opportunities = self.max_opportunities;
        request.ranking_strategy = self.strategy.as_deref().map(RankingStrategy::from_name);
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();
    let defaults = EngineDefaults::from_env();
    let source = CombinedSource::from_settings(&settings)?;

    let result = match cli.command {
        Command::Recommend {
            amount,
            filters,
            output,
        } => {
            let advisor = GeminiClient::from_settings(&settings)?;
            let engine = RecommendationEngine::new(source, advisor, defaults);
            recommend(&engine, filters.into_request(amount), output).await
        }
        Command::Opportunities { filters } => {
            // Ranking ignores the amount.
            let request = filters.into_request(0.0);
            let ranked = engine::rank_opportunities(&source, &request, &defaults).await?;
            print!("{}", render::opportunities(&ranked));
            Ok(())
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
            tracing::error!(
                stage = diag.stage,
                raw_output = diag.raw_output.as_deref().unwrap_or(""),
                "advisory call failed"
            );
        }
    }
    result
}

async fn recommend(
    engine: &RecommendationEngine<CombinedSource, GeminiClient>,
    request: RecommendationRequest,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let result = engine.recommend(&request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let (response, outcome) = match result {
        Ok(rec) => {
            print!("{}", render::recommendation(&rec));
            (RecommendationResponse::success(rec, elapsed_ms), Ok(()))
        }
        Err(err) => (
            RecommendationResponse::failure(format!("{err:#}"), elapsed_ms),
            Err(err),
        ),
    };

    if let Some(path) = output {
        let body = serde_json::to_string_pretty(&response)?;
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write response to {}", path.display()))?;
        tracing::info!(path = %path.display(), success = response.success, "response written");
    }

    outcome
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recommend_flags() {
        let cli = Cli::try_parse_from([
            "yieldagent",
            "recommend",
            "--amount",
            "2500",
            "--risk",
            "high",
            "--chains",
            "Ethereum",
            "Stellar",
            "--strategy",
            "sharpe",
            "--max-opportunities",
            "5",
        ])
        .unwrap();

        let Command::Recommend {
            amount,
            filters,
            output,
        } = cli.command
        else {
            panic!("expected recommend");
        };
        assert_eq!(amount, 2500.0);
        assert!(output.is_none());

        let req = filters.into_request(amount);
        assert_eq!(req.risk_tolerance, RiskTolerance::High);
        assert_eq!(
            req.preferred_chains,
            Some(vec!["Ethereum".to_string(), "Stellar".to_string()])
        );
        assert_eq!(req.ranking_strategy, Some(RankingStrategy::Sharpe));
        assert_eq!(req.max_opportunities, Some(5));
    }

    #[test]
    fn opportunities_defaults() {
        let cli = Cli::try_parse_from(["yieldagent", "opportunities"]).unwrap();
        let Command::Opportunities { filters } = cli.command else {
            panic!("expected opportunities");
        };
        let req = filters.into_request(0.0);
        assert_eq!(req.risk_tolerance, RiskTolerance::Medium);
        assert_eq!(req.preferred_chains, None);
        assert_eq!(req.ranking_strategy, None);
    }

    #[test]
    fn recommend_requires_amount() {
        assert!(Cli::try_parse_from(["yieldagent", "recommend"]).is_err());
    }
}
