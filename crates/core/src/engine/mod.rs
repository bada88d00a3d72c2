pub mod reconcile;

use crate::config::EngineDefaults;
use crate::domain::opportunity::Opportunity;
use crate::domain::recommendation::{RankedOpportunities, Recommendation, RecommendationRequest};
use crate::error::EngineError;
use crate::ingest::OpportunitySource;
use crate::llm::normalize::{self, NormalizeOptions};
use crate::llm::{AdvisoryInput, LlmClient};
use crate::risk;
use crate::selection::{self, FilterConstraints};
use anyhow::Context;

pub use reconcile::{reconcile, LookupIndex, MatchStrategy, ResolvedAllocation, UnmatchedAllocation};

/// Fetch, score, filter, rank and summarise: everything short of the advisory call.
/// `request.amount_usd` is not consulted.
///
/// Fails with [`EngineError::NoOpportunities`] when the constraints leave nothing.
pub async fn rank_opportunities<S: OpportunitySource + ?Sized>(
    source: &S,
    request: &RecommendationRequest,
    defaults: &EngineDefaults,
) -> anyhow::Result<RankedOpportunities> {
    if let Some(n) = request.max_opportunities {
        anyhow::ensure!(n > 0, EngineError::invalid("max_opportunities must be positive"));
    }
    if let Some(min) = request.min_liquidity_usd {
        anyhow::ensure!(
            min >= 0.0,
            EngineError::invalid("min_liquidity_usd must not be negative")
        );
    }

    let max_tier = request.risk_tolerance.max_tier();
    let chains = request.preferred_chains.as_deref();

    let fetched: Vec<Opportunity> = source
        .fetch_opportunities(chains)
        .await
        .with_context(|| format!("failed to fetch opportunities from {}", source.source_name()))?
        .into_iter()
        .map(|o| {
            if o.risk_score.is_some() && o.risk_tier.is_some() {
                o
            } else {
                risk::annotate(o)
            }
        })
        .collect();
    let data_age = source.data_age(chains).await;

    let constraints = FilterConstraints {
        min_tvl_usd: Some(request.min_liquidity_usd.unwrap_or(defaults.min_liquidity_usd)),
        min_apy: request.min_apy,
        max_risk_tier: Some(max_tier),
        chains: request.preferred_chains.clone(),
    };
    let filtered = selection::filter::apply(&fetched, &constraints);
    if filtered.is_empty() {
        return Err(EngineError::NoOpportunities {
            fetched: fetched.len(),
        }
        .into());
    }

    let strategy = request.ranking_strategy.unwrap_or(defaults.ranking_strategy);
    let top_n = request.max_opportunities.unwrap_or(defaults.max_opportunities);
    let mut ranked = selection::rank(&filtered, strategy);
    ranked.truncate(top_n);

    let distribution = risk::distribution(&ranked);
    tracing::info!(
        source = source.source_name(),
        fetched = fetched.len(),
        filtered = filtered.len(),
        top_n = ranked.len(),
        %strategy,
        %max_tier,
        grade = %distribution.grade,
        "opportunities ranked"
    );

    Ok(RankedOpportunities {
        strategy,
        fetched: fetched.len(),
        filtered: filtered.len(),
        opportunities: ranked,
        risk_distribution: distribution,
        data_freshness_seconds: data_age.as_secs(),
    })
}

pub struct RecommendationEngine<S, L> {
    source: S,
    advisor: L,
    defaults: EngineDefaults,
}

impl<S: OpportunitySource, L: LlmClient> RecommendationEngine<S, L> {
    pub fn new(source: S, advisor: L, defaults: EngineDefaults) -> Self {
        Self {
            source,
            advisor,
            defaults,
        }
    }

    pub fn advisor(&self) -> &L {
        &self.advisor
    }

    pub async fn rank_only(&self, request: &RecommendationRequest) -> anyhow::Result<RankedOpportunities> {
        rank_opportunities(&self.source, request, &self.defaults).await
    }

    pub async fn recommend(&self, request: &RecommendationRequest) -> anyhow::Result<Recommendation> {
        anyhow::ensure!(
            request.amount_usd.is_finite() && request.amount_usd > 0.0,
            EngineError::invalid(format!(
                "amount_usd must be a positive number, got {}",
                request.amount_usd
            ))
        );

        let ranked = self.rank_only(request).await?;

        let input = AdvisoryInput {
            amount_usd: request.amount_usd,
            risk_tolerance: request.risk_tolerance,
            preferred_chains: request.preferred_chains.clone(),
            min_liquidity_usd: Some(
                request
                    .min_liquidity_usd
                    .unwrap_or(self.defaults.min_liquidity_usd),
            ),
            risk_distribution: ranked.risk_distribution.clone(),
            opportunities: ranked.opportunities.clone(),
        };
        let raw = self
            .advisor
            .generate_advice(&input)
            .await
            .with_context(|| format!("advisory request to {} failed", self.advisor.provider()))?;

        let normalized = normalize::normalize_with(
            raw,
            &NormalizeOptions {
                default_risk_grade: self.defaults.risk_grade.clone(),
            },
        )?;
        for w in &normalized.warnings {
            tracing::warn!(field = %w.field, detail = %w.detail, "advisory payload schema mismatch");
        }

        let payload = normalized.payload;
        let reconciled = reconcile::reconcile_with(
            &payload,
            &ranked.opportunities,
            self.defaults.allocation_risk_tier,
        );

        let warnings: Vec<String> = normalized
            .warnings
            .iter()
            .map(ToString::to_string)
            .chain(reconciled.unmatched.iter().map(ToString::to_string))
            .collect();

        tracing::info!(
            proposed = payload.allocations.len(),
            resolved = reconciled.allocations.len(),
            unmatched = reconciled.unmatched.len(),
            warnings = warnings.len(),
            "advisory allocations reconciled"
        );

        let allocations = reconciled
            .allocations
            .iter()
            .map(ResolvedAllocation::to_portfolio_allocation)
            .collect();

        Ok(Recommendation {
            id: uuid::Uuid::new_v4(),
            requested_amount_usd: request.amount_usd,
            risk_tolerance: request.risk_tolerance,
            preferred_chains: request.preferred_chains.clone(),
            min_liquidity_usd: request.min_liquidity_usd,
            ranking_strategy: ranked.strategy,
            allocations,
            total_allocated_usd: payload.total_allocated_usd,
            weighted_expected_apy: payload.weighted_expected_apy,
            overall_risk_grade: payload.overall_risk_grade,
            diversification_score: payload.diversification_score,
            summary: payload.summary,
            key_risks: payload.key_risks,
            opportunities: payload.opportunities,
            rationale: payload.rationale,
            projected_returns: payload.projected_returns,
            estimated_fees: payload.estimated_fees,
            confidence_score: payload.confidence_score,
            risk_distribution: ranked.risk_distribution,
            warnings,
            generated_at: chrono::Utc::now(),
            data_freshness_seconds: ranked.data_freshness_seconds,
        })
    }
}
