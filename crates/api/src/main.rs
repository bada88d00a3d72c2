use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yieldagent_core::config::{EngineDefaults, Settings};
use yieldagent_core::domain::recommendation::{
    RankedOpportunities, RecommendationRequest, RecommendationResponse, RiskTolerance,
};
use yieldagent_core::engine::{self, RecommendationEngine};
use yieldagent_core::ingest::{CachedSource, CombinedSource};
use yieldagent_core::llm::gemini::GeminiClient;
use yieldagent_core::selection::RankingStrategy;
use yieldagent_core::EngineError;

const SERVICE_NAME: &str = "yieldagent-api";
const DEFAULT_PORT: u16 = 8000;

type Source = Arc<CachedSource<CombinedSource>>;
type Engine = RecommendationEngine<Source, GeminiClient>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let defaults = EngineDefaults::from_env();
    let cache_ttl = Duration::from_secs(defaults.cache_ttl_secs);
    let source: Source = Arc::new(CachedSource::new(
        CombinedSource::from_settings(&settings)?,
        cache_ttl,
    ));
    tokio::spawn(purge_cache(source.clone(), cache_ttl));

    let engine = match GeminiClient::from_settings(&settings) {
        Ok(client) => {
            tracing::info!(model = client.model(), "advisory client ready");
            Some(Arc::new(RecommendationEngine::new(
                source.clone(),
                client,
                defaults.clone(),
            )))
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "advisory client unavailable; starting API in degraded mode");
            None
        }
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let state = AppState {
        source,
        engine,
        defaults: Arc::new(defaults),
        port,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/health/detailed", get(health_detailed))
        .route("/api/recommendations", post(create_recommendation))
        .route("/api/opportunities", get(list_opportunities))
        .with_state(state)
        .layer(cors_layer(&settings))
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    source: Source,
    engine: Option<Arc<Engine>>,
    defaults: Arc<EngineDefaults>,
    port: u16,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health_detailed(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (status, gemini) = if state.engine.is_some() {
        ("healthy", "configured")
    } else {
        ("degraded", "missing")
    };
    Json(serde_json::json!({
        "status": status,
        "service": SERVICE_NAME,
        "dependencies": {
            "gemini_api": gemini,
            "market_data": state.source.inner().member_names(),
        },
        "environment": {
            "port": state.port,
        },
    }))
}

async fn create_recommendation(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> (StatusCode, Json<RecommendationResponse>) {
    let started = Instant::now();
    let Some(engine) = &state.engine else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(RecommendationResponse::failure(
                "advisory service is not configured (GEMINI_API_KEY missing)",
                0.0,
            )),
        );
    };

    let result = engine.recommend(&request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(rec) => {
            tracing::info!(
                id = %rec.id,
                allocations = rec.allocations.len(),
                warnings = rec.warnings.len(),
                elapsed_ms,
                "recommendation generated"
            );
            (
                StatusCode::OK,
                Json(RecommendationResponse::success(rec, elapsed_ms)),
            )
        }
        Err(err) => {
            let status = status_for(&err);
            (
                status,
                Json(RecommendationResponse::failure(
                    error_message(&err, status),
                    elapsed_ms,
                )),
            )
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OpportunitiesQuery {
    /// Comma separated.
    chain: Option<String>,
    risk_tolerance: Option<String>,
    strategy: Option<String>,
    limit: Option<usize>,
    min_liquidity_usd: Option<f64>,
    min_apy: Option<f64>,
}

impl OpportunitiesQuery {
    fn into_request(self) -> RecommendationRequest {
        let chains: Vec<String> = self
            .chain
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        // Ranking ignores the amount.
        let mut request = RecommendationRequest::new(0.0);
        request.risk_tolerance = self
            .risk_tolerance
            .as_deref()
            .map(RiskTolerance::from_name)
            .unwrap_or_default();
        request.preferred_chains = (!chains.is_empty()).then_some(chains);
        request.min_liquidity_usd = self.min_liquidity_usd;
        request.min_apy = self.min_apy;
        request.max_opportunities = self.limit;
        request.ranking_strategy = self.strategy.as_deref().map(RankingStrategy::from_name);
        request
    }
}

async fn list_opportunities(
    State(state): State<AppState>,
    Query(query): Query<OpportunitiesQuery>,
) -> Result<Json<RankedOpportunities>, ApiError> {
    let request = query.into_request();
    let ranked = engine::rank_opportunities(&state.source, &request, &state.defaults)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ranked))
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = status_for(&err);
        Self {
            message: error_message(&err, status),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({"success": false, "error": self.message});
        (self.status, Json(body)).into_response()
    }
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<EngineError>() {
        Some(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client errors are returned verbatim; server errors are reported and logged with the
/// full cause chain.
fn error_message(err: &anyhow::Error, status: StatusCode) -> String {
    if status.is_client_error() {
        tracing::info!(error = %err, "request rejected");
        return match err.downcast_ref::<EngineError>() {
            Some(e) => e.to_string(),
            None => err.to_string(),
        };
    }
    sentry_anyhow::capture_anyhow(err);
    tracing::error!(error = %format!("{err:#}"), "request failed");
    format!("{err:#}")
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins()
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}

async fn purge_cache(source: Source, ttl: Duration) {
    let mut tick = tokio::time::interval(ttl.max(Duration::from_secs(1)));
    loop {
        tick.tick().await;
        let purged = source.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "expired opportunity cache entries purged");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
    fn query_maps_onto_request() {
        let query = OpportunitiesQuery {
            chain: Some("Ethereum, Stellar,".to_string()),
            risk_tolerance: Some("aggressive".to_string()),
            strategy: Some("sharpe".to_string()),
            limit: Some(5),
            min_liquidity_usd: None,
            min_apy: Some(3.0),
        };
        let req = query.into_request();
        assert_eq!(
            req.preferred_chains,
            Some(vec!["Ethereum".to_string(), "Stellar".to_string()])
        );
        assert_eq!(req.risk_tolerance, RiskTolerance::High);
        assert_eq!(req.ranking_strategy, Some(RankingStrategy::Sharpe));
        assert_eq!(req.max_opportunities, Some(5));
        assert_eq!(req.min_apy, Some(3.0));

        let req = OpportunitiesQuery::default().into_request();
        assert_eq!(req.preferred_chains, None);
        assert_eq!(req.ranking_strategy, None);
        assert_eq!(req.risk_tolerance, RiskTolerance::Medium);
    }

    #[test]
    fn engine_errors_map_to_status_codes() {
        let no_opps: anyhow::Error = EngineError::NoOpportunities { fetched: 3 }.into();
        assert_eq!(status_for(&no_opps), StatusCode::BAD_REQUEST);

        let invalid = anyhow::Error::from(EngineError::invalid("amount")).context("recommend");
        assert_eq!(status_for(&invalid), StatusCode::BAD_REQUEST);

        let malformed: anyhow::Error = EngineError::malformed("not json").into();
        assert_eq!(status_for(&malformed), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            status_for(&anyhow::anyhow!("network down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
