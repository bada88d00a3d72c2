use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use yieldagent_core::config::EngineDefaults;
use yieldagent_core::domain::opportunity::{Opportunity, RiskGrade, RiskTier};
use yieldagent_core::domain::recommendation::{RecommendationRequest, RiskTolerance};
use yieldagent_core::engine::RecommendationEngine;
use yieldagent_core::ingest::OpportunitySource;
use yieldagent_core::llm::{AdvisoryInput, LlmClient, Provider};
use yieldagent_core::selection::RankingStrategy;
use yieldagent_core::EngineError;

struct FixedSource {
    pools: Vec<Opportunity>,
}

#[async_trait::async_trait]
impl OpportunitySource for FixedSource {
    fn source_name(&self) -> &'static str {
        "fixed"
    }

    async fn fetch_opportunities(
        &self,
        _chains: Option<&[String]>,
    ) -> anyhow::Result<Vec<Opportunity>> {
        Ok(self.pools.clone())
    }
}

struct CannedAdvisor {
    payload: Value,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl CannedAdvisor {
    fn new(payload: Value) -> Self {
        Self {
            payload,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for CannedAdvisor {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate_advice(&self, input: &AdvisoryInput) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> = input
            .opportunities
            .iter()
            .filter_map(|o| o.pool_id.clone())
            .collect();
        *self.seen.lock().unwrap() = ids;
        Ok(self.payload.clone())
    }
}

#[allow(clippy::too_many_arguments)]
fn pool(
    pool_id: &str,
    chain: &str,
    project: &str,
    symbol: &str,
    tvl: f64,
    apy: f64,
    stablecoin: bool,
    il_risk: &str,
    predicted_class: Option<&str>,
) -> Opportunity {
    let mut o = Opportunity::new(chain, project, symbol);
    o.pool_id = Some(pool_id.to_string());
    o.tvl_usd = Some(tvl);
    o.apy = Some(apy);
    o.stablecoin = Some(stablecoin);
    o.il_risk = Some(il_risk.to_string());
    o.predicted_class = predicted_class.map(String::from);
    o
}

fn market() -> Vec<Opportunity> {
    let mut aave = pool("p1", "Ethereum", "aave-v3", "USDC", 1.0e8, 4.0, true, "no", Some("Stable/Up"));
    aave.predicted_probability = Some(90.0);
    let mut gmx = pool("p5", "Arbitrum", "gmx", "ETH", 3.0e7, 25.0, false, "yes", None);
    gmx.apy_pct_7d = Some(6.0);
    vec![
        aave,
        pool("p2", "Ethereum", "compound-v3", "USDT", 5.0e7, 5.0, true, "no", Some("Stable/Up")),
        pool("p3", "Stellar", "blend", "XLM", 2.0e6, 9.0, false, "no", None),
        pool("p4", "Ethereum", "tiny", "DAI", 10_000.0, 3.0, true, "no", Some("Stable/Up")),
        gmx,
    ]
}

fn advisory_payload() -> Value {
    json!({
        "recommendation": {
            "executive_summary": "Two stable lending pools",
            "allocations": [
                {"pool": "p1", "protocol": "aave-v3", "asset": "USDC", "amount_usd": "6000",
                 "percentage": 60, "apy": 4.0, "risk_level": "A", "rationale": "deep liquidity"},
                {"protocol": "Compound-V3", "asset": "usdt", "amount": 4000, "weight": "40%",
                 "expected_yield": 5.0, "reason": "diversify"},
                {"protocol": "Nowhere", "asset": "FOO", "amount": 100, "percentage": 1, "apy": 50}
            ],
            "top_risks": ["smart contract risk"],
            "confidence_level": 80
        }
    })
}

fn engine(payload: Value) -> RecommendationEngine<FixedSource, CannedAdvisor> {
    RecommendationEngine::new(
        FixedSource { pools: market() },
        CannedAdvisor::new(payload),
        EngineDefaults::default(),
    )
}

#[tokio::test]
async fn recommends_reconciled_portfolio() {
    let engine = engine(advisory_payload());
    let rec = engine
        .recommend(&RecommendationRequest::new(10_000.0))
        .await
        .unwrap();

    // Medium tolerance keeps tiers A and B with at least 50k TVL.
    assert_eq!(rec.risk_distribution.total, 2);
    assert_eq!(rec.risk_distribution.metric(RiskTier::A).count, 2);
    assert_eq!(rec.risk_distribution.grade, RiskGrade::A);
    assert_eq!(rec.ranking_strategy, RankingStrategy::RiskAdjusted);

    assert_eq!(rec.allocations.len(), 2);
    assert_eq!(rec.allocations[0].opportunity.pool_id.as_deref(), Some("p1"));
    assert_eq!(rec.allocations[0].allocation_usd, 6000.0);
    assert_eq!(rec.allocations[0].risk_tier, RiskTier::A);
    assert_eq!(rec.allocations[1].opportunity.pool_id.as_deref(), Some("p2"));
    assert_eq!(rec.allocations[1].allocation_percentage, 40.0);
    assert_eq!(rec.allocations[1].risk_tier, RiskTier::B);
    assert_eq!(rec.allocations[1].reasoning, "diversify");

    assert_eq!(rec.summary, "Two stable lending pools");
    assert_eq!(rec.rationale, "Two stable lending pools");
    assert_eq!(rec.key_risks, vec!["smart contract risk".to_string()]);
    assert_eq!(rec.confidence_score, 80.0);
    assert_eq!(rec.overall_risk_grade, "B");
    assert_eq!(rec.total_allocated_usd, 10_100.0);
    assert_eq!(rec.diversification_score, 60.0);

    let unmatched: Vec<&String> = rec
        .warnings
        .iter()
        .filter(|w| w.starts_with("unmatched allocation"))
        .collect();
    assert_eq!(unmatched.len(), 1);
    assert!(unmatched[0].contains("project=Nowhere"));
    assert!(rec.warnings.iter().any(|w| w.starts_with("schema: total_allocated_usd")));

    assert_eq!(
        *engine.advisor().seen.lock().unwrap(),
        vec!["p1".to_string(), "p2".to_string()]
    );
}

#[tokio::test]
async fn rank_only_honours_strategy_tolerance_and_limit() {
    let engine = engine(advisory_payload());
    let mut request = RecommendationRequest::new(1.0);
    request.risk_tolerance = RiskTolerance::High;
    request.ranking_strategy = Some(RankingStrategy::MaxYield);

    let ranked = engine.rank_only(&request).await.unwrap();
    assert_eq!(ranked.fetched, 5);
    assert_eq!(ranked.filtered, 3);
    let ids: Vec<&str> = ranked
        .opportunities
        .iter()
        .filter_map(|o| o.pool_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["p3", "p2", "p1"]);
    assert!(ranked.opportunities.iter().all(|o| o.risk_tier.is_some()));
    assert_eq!(ranked.risk_distribution.metric(RiskTier::C).count, 1);

    request.max_opportunities = Some(1);
    let ranked = engine.rank_only(&request).await.unwrap();
    assert_eq!(ranked.opportunities.len(), 1);
    assert_eq!(ranked.risk_distribution.total, 1);
    assert_eq!(engine.advisor().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_selection_is_a_constraint_error() {
    let engine = engine(advisory_payload());
    let mut request = RecommendationRequest::new(10_000.0);
    request.min_apy = Some(1_000.0);

    let err = engine.recommend(&request).await.unwrap_err();
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::NoOpportunities { fetched }) => assert_eq!(*fetched, 5),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.advisor().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_object_advice_is_malformed() {
    let engine = engine(json!(["not", "an", "object"]));
    let err = engine
        .recommend(&RecommendationRequest::new(10_000.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::MalformedAdvisoryPayload { .. })
    ));
}

#[tokio::test]
async fn rejects_non_positive_amount_before_fetching() {
    let engine = engine(advisory_payload());
    let err = engine
        .recommend(&RecommendationRequest::new(0.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InvalidRequest { .. })
    ));
    assert!(engine
        .recommend(&RecommendationRequest::new(f64::NAN))
        .await
        .is_err());
    assert_eq!(engine.advisor().calls.load(Ordering::SeqCst), 0);
}
