use crate::domain::opportunity::{Opportunity, RiskDistribution, RiskGrade, RiskMetric, RiskTier};
use crate::risk::scorer;

/// Tier breakdown and overall grade for a set of opportunities.
///
/// Tiers are recomputed from the inputs rather than read from `risk_tier`, so unscored
/// opportunities are handled the same as scored ones.
pub fn distribution(opportunities: &[Opportunity]) -> RiskDistribution {
    let total = opportunities.len();
    let mut counts = [0usize; 4];
    for opp in opportunities {
        counts[scorer::classify(opp).rank() as usize] += 1;
    }

    let metrics = RiskTier::ALL.map(|tier| {
        let count = counts[tier.rank() as usize];
        RiskMetric {
            tier,
            count,
            percentage: percentage(count, total),
        }
    });

    let grade = if total == 0 {
        RiskGrade::NotAvailable
    } else {
        grade_for_stability(stability(&counts, total))
    };

    RiskDistribution {
        distribution: metrics,
        grade,
        total,
    }
}

/// `(4A + 2B - C - 2D) / total`.
fn stability(counts: &[usize; 4], total: usize) -> f64 {
    let [a, b, c, d] = counts.map(|n| n as f64);
    (4.0 * a + 2.0 * b - c - 2.0 * d) / total as f64
}

fn grade_for_stability(stability: f64) -> RiskGrade {
    if stability >= 3.2 {
        RiskGrade::A
    } else if stability >= 1.5 {
        RiskGrade::BPlus
    } else if stability >= 1.0 {
        RiskGrade::B
    } else if stability >= 0.2 {
        RiskGrade::BMinus
    } else if stability >= -0.5 {
        RiskGrade::C
    } else {
        RiskGrade::CMinus
    }
}

// Each tier is rounded on its own (half to even); the sum can drift off 100.
fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round_ties_even() as u32
}
