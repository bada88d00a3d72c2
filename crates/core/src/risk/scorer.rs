use crate::domain::opportunity::{Opportunity, RiskTier};

/// Safety score for one opportunity: higher is safer.
///
/// Every adjustment is additive and independent of the others, so the order the rules are
/// applied in does not change the total.
pub fn score(opp: &Opportunity) -> f64 {
    let mut score = 0.0;

    score += prediction_class_adjustment(opp.predicted_class.as_deref());

    if let Some(probability) = opp.predicted_probability {
        score += probability_adjustment(probability);
    }

    let il_risk = opp.has_il_risk();
    score += if il_risk { -2.0 } else { 0.5 };

    if opp
        .exposure
        .as_deref()
        .is_some_and(|e| e.eq_ignore_ascii_case("multi"))
    {
        score -= 0.5;
    }

    score += apy_adjustment(opp.apy.unwrap_or(0.0));

    if let Some(volatility) = volatility(opp) {
        score += volatility_adjustment(volatility);
    }

    if opp.stablecoin.unwrap_or(false) && !il_risk {
        score += 1.0;
    }

    score
}

/// Tier from a precomputed score.
pub fn tier_for_score(score: f64) -> RiskTier {
    if score >= 3.0 {
        RiskTier::A
    } else if score >= 1.0 {
        RiskTier::B
    } else if score >= -1.5 {
        RiskTier::C
    } else {
        RiskTier::D
    }
}

pub fn classify(opp: &Opportunity) -> RiskTier {
    tier_for_score(score(opp))
}

/// Returns the opportunity with `risk_score` and `risk_tier` filled in.
pub fn annotate(mut opp: Opportunity) -> Opportunity {
    let s = score(&opp);
    opp.risk_score = Some(s);
    opp.risk_tier = Some(tier_for_score(s));
    opp
}

/// Largest observed APY swing: `|apy_pct_7d|` and `|apy - apy_mean_30d|`, each only when
/// its inputs are present. `None` when neither can be computed.
pub fn volatility(opp: &Opportunity) -> Option<f64> {
    let pct_7d = opp.apy_pct_7d.map(f64::abs);
    let drift_30d = match (opp.apy, opp.apy_mean_30d) {
        (Some(apy), Some(mean)) => Some((apy - mean).abs()),
        _ => None,
    };

    match (pct_7d, drift_30d) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn prediction_class_adjustment(class: Option<&str>) -> f64 {
    let class = class.unwrap_or("").to_lowercase();
    match class.as_str() {
        "" => 0.0,
        "stable/up" => 2.0,
        "down" => -2.0,
        _ => 0.5,
    }
}

// Extreme bands win: >=85 and <=20 are checked before the inner >=70 / <=35 bands.
fn probability_adjustment(probability: f64) -> f64 {
    if probability >= 85.0 {
        2.0
    } else if probability >= 70.0 {
        1.0
    } else if probability <= 20.0 {
        -2.0
    } else if probability <= 35.0 {
        -1.0
    } else {
        0.0
    }
}

fn apy_adjustment(apy: f64) -> f64 {
    if apy >= 20.0 {
        -1.5
    } else if apy >= 12.0 {
        -1.0
    } else if apy >= 8.0 {
        -0.5
    } else {
        0.0
    }
}

fn volatility_adjustment(volatility: f64) -> f64 {
    if volatility >= 5.0 {
        -2.0
    } else if volatility >= 2.0 {
        -1.0
    } else if volatility >= 1.0 {
        -0.5
    } else {
        0.0
    }
}
