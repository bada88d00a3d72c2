use std::collections::BTreeMap;
use std::fmt::Write;

use yieldagent_core::domain::opportunity::{Opportunity, RiskDistribution, RiskTier};
use yieldagent_core::domain::recommendation::{RankedOpportunities, Recommendation};
use yieldagent_core::llm::prompt::group_thousands;

pub fn recommendation(rec: &Recommendation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Recommendation {}", rec.id);
    let _ = writeln!(
        out,
        "  amount ${}  tolerance {}  strategy {}",
        group_thousands(rec.requested_amount_usd, 2),
        rec.risk_tolerance.as_str(),
        rec.ranking_strategy
    );
    let _ = writeln!(
        out,
        "  allocated ${}  weighted APY {:.2}%  grade {}  diversification {:.1}",
        group_thousands(rec.total_allocated_usd, 2),
        rec.weighted_expected_apy,
        rec.overall_risk_grade,
        rec.diversification_score
    );
    out.push('\n');

    for a in &rec.allocations {
        let _ = writeln!(
            out,
            "  {:>5.1}%  ${:>14}  {:>6.2}%  [{}]  {}",
            a.allocation_percentage,
            group_thousands(a.allocation_usd, 2),
            a.expected_apy,
            a.risk_tier,
            label(&a.opportunity)
        );
    }
    if rec.allocations.is_empty() {
        out.push_str("  (no allocations matched live pools)\n");
    }

    if !rec.summary.is_empty() {
        let _ = writeln!(out, "\n{}", rec.summary);
    }
    amounts(&mut out, "Projected returns", &rec.projected_returns);
    amounts(&mut out, "Estimated fees", &rec.estimated_fees);
    list(&mut out, "Key risks", &rec.key_risks);
    list(&mut out, "Opportunities", &rec.opportunities);
    if !rec.rationale.is_empty() {
        let _ = writeln!(out, "\nRationale: {}", rec.rationale);
    }
    let _ = writeln!(out, "\nConfidence: {:.0}/100", rec.confidence_score);
    list(&mut out, "Warnings", &rec.warnings);
    distribution(&mut out, &rec.risk_distribution);
    out
}

pub fn opportunities(ranked: &RankedOpportunities) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} of {} pools passed filters; top {} by {} (data age {}s)",
        ranked.filtered,
        ranked.fetched,
        ranked.opportunities.len(),
        ranked.strategy,
        ranked.data_freshness_seconds
    );
    for (i, o) in ranked.opportunities.iter().enumerate() {
        let tier = o.risk_tier.map(RiskTier::as_str).unwrap_or("?");
        let _ = writeln!(
            out,
            "  {:>2}. [{}] {:>6.2}%  tvl ${:>16}  score {:>4.1}  {}",
            i + 1,
            tier,
            o.apy.unwrap_or(0.0),
            group_thousands(o.tvl_usd.unwrap_or(0.0), 0),
            o.risk_score.unwrap_or(0.0),
            label(o)
        );
    }
    distribution(&mut out, &ranked.risk_distribution);
    out
}

fn label(o: &Opportunity) -> String {
    format!("{} {} on {}", o.project, o.symbol, o.chain)
}

fn list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}:");
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}

fn amounts(out: &mut String, title: &str, values: &BTreeMap<String, f64>) {
    if values.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}:");
    for (period, usd) in values {
        let _ = writeln!(out, "  {period:<6} ${}", group_thousands(*usd, 2));
    }
}

fn distribution(out: &mut String, dist: &RiskDistribution) {
    let mix: Vec<String> = dist
        .distribution
        .iter()
        .map(|m| format!("{} {}%", m.tier, m.percentage))
        .collect();
    let _ = writeln!(out, "\nRisk mix ({} pools, grade {}): {}", dist.total, dist.grade, mix.join(", "));
}
