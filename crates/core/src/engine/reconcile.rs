//! Maps normalised advisory allocations back onto the ranked opportunities.

use crate::config::DEFAULT_ALLOCATION_RISK_TIER;
use crate::domain::contract::{AdvisoryAllocation, AdvisoryPayload};
use crate::domain::opportunity::{Opportunity, RiskTier};
use crate::domain::recommendation::PortfolioAllocation;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Candidate keys to opportunity, built fresh for every reconciliation.
///
/// Per opportunity, in this order: pool id (when present), `"{project}-{symbol}"`, its
/// lowercase form, lowercase project, lowercase symbol. All keys share one namespace and
/// the last write wins: a later opportunity producing an existing key replaces the
/// earlier one.
#[derive(Debug, Default)]
pub struct LookupIndex<'a> {
    keys: HashMap<String, &'a Opportunity>,
}

impl<'a> LookupIndex<'a> {
    pub fn build(opportunities: &'a [Opportunity]) -> Self {
        let mut keys = HashMap::with_capacity(opportunities.len() * 5);
        for opp in opportunities {
            if let Some(pool_id) = opp.pool_id.as_deref().filter(|p| !p.is_empty()) {
                keys.insert(pool_id.to_string(), opp);
            }
            let combined = opp.combined_key();
            keys.insert(combined.to_lowercase(), opp);
            keys.insert(combined, opp);
            keys.insert(opp.project.to_lowercase(), opp);
            keys.insert(opp.symbol.to_lowercase(), opp);
        }
        Self { keys }
    }

    pub fn get(&self, key: &str) -> Option<&'a Opportunity> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Which rule resolved an allocation, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    PoolId,
    CombinedKey,
    CombinedKeyLowercase,
    Project,
    FuzzyProjectSymbol,
    FuzzyProject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAllocation<'a> {
    pub opportunity: &'a Opportunity,
    pub allocation_percentage: f64,
    pub allocation_usd: f64,
    pub expected_apy: f64,
    pub risk_tier: RiskTier,
    pub reasoning: String,
    pub matched_by: MatchStrategy,
}

impl ResolvedAllocation<'_> {
    pub fn to_portfolio_allocation(&self) -> PortfolioAllocation {
        PortfolioAllocation {
            opportunity: self.opportunity.clone(),
            allocation_percentage: self.allocation_percentage,
            allocation_usd: self.allocation_usd,
            expected_apy: self.expected_apy,
            risk_tier: self.risk_tier,
            reasoning: self.reasoning.clone(),
        }
    }
}

/// An allocation entry that resolved to no opportunity and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedAllocation {
    pub pool_id: String,
    pub project: String,
    pub symbol: String,
}

impl fmt::Display for UnmatchedAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unmatched allocation: pool_id={} project={} symbol={}",
            self.pool_id, self.project, self.symbol
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation<'a> {
    pub allocations: Vec<ResolvedAllocation<'a>>,
    pub unmatched: Vec<UnmatchedAllocation>,
}

pub fn reconcile<'a>(payload: &AdvisoryPayload, opportunities: &'a [Opportunity]) -> Reconciliation<'a> {
    reconcile_with(payload, opportunities, DEFAULT_ALLOCATION_RISK_TIER)
}

/// `default_tier` applies to entries whose `risk_tier` is absent or unparseable.
pub fn reconcile_with<'a>(
    payload: &AdvisoryPayload,
    opportunities: &'a [Opportunity],
    default_tier: RiskTier,
) -> Reconciliation<'a> {
    let index = LookupIndex::build(opportunities);
    if index.is_empty() && !payload.allocations.is_empty() {
        tracing::warn!(
            proposed = payload.allocations.len(),
            "no opportunities to reconcile against"
        );
    } else {
        tracing::debug!(keys = index.len(), proposed = payload.allocations.len(), "lookup index built");
    }
    let mut out = Reconciliation::default();

    for entry in &payload.allocations {
        match resolve(entry, &index, opportunities) {
            Some((opportunity, matched_by)) => {
                let risk_tier = entry
                    .risk_tier
                    .as_deref()
                    .and_then(|t| t.parse::<RiskTier>().ok())
                    .unwrap_or(default_tier);
                out.allocations.push(ResolvedAllocation {
                    opportunity,
                    allocation_percentage: entry.allocation_percentage,
                    allocation_usd: entry.allocation_usd,
                    expected_apy: entry.expected_apy,
                    risk_tier,
                    reasoning: entry.reasoning.clone(),
                    matched_by,
                });
            }
            None => {
                tracing::warn!(
                    pool_id = %entry.pool_id,
                    project = %entry.project,
                    symbol = %entry.symbol,
                    "advisory allocation matches no opportunity; dropped"
                );
                out.unmatched.push(UnmatchedAllocation {
                    pool_id: entry.pool_id.clone(),
                    project: entry.project.clone(),
                    symbol: entry.symbol.clone(),
                });
            }
        }
    }

    out
}

fn resolve<'a>(
    entry: &AdvisoryAllocation,
    index: &LookupIndex<'a>,
    opportunities: &'a [Opportunity],
) -> Option<(&'a Opportunity, MatchStrategy)> {
    if !entry.pool_id.is_empty() {
        if let Some(opp) = index.get(&entry.pool_id) {
            return Some((opp, MatchStrategy::PoolId));
        }
    }

    let combined = format!("{}-{}", entry.project, entry.symbol);
    if let Some(opp) = index.get(&combined) {
        return Some((opp, MatchStrategy::CombinedKey));
    }
    if let Some(opp) = index.get(&combined.to_lowercase()) {
        return Some((opp, MatchStrategy::CombinedKeyLowercase));
    }

    if entry.project.is_empty() {
        return None;
    }
    if let Some(opp) = index.get(&entry.project.to_lowercase()) {
        return Some((opp, MatchStrategy::Project));
    }

    // Linear scan, whitespace-insensitive on top of case-insensitive.
    let project = entry.project.trim().to_lowercase();
    let symbol = entry.symbol.trim().to_lowercase();
    let same_project = |o: &&Opportunity| o.project.trim().to_lowercase() == project;

    if let Some(opp) = opportunities
        .iter()
        .filter(same_project)
        .find(|o| o.symbol.trim().to_lowercase() == symbol)
    {
        return Some((opp, MatchStrategy::FuzzyProjectSymbol));
    }
    opportunities
        .iter()
        .find(same_project)
        .map(|opp| (opp, MatchStrategy::FuzzyProject))
}
