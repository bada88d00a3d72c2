use crate::domain::opportunity::{Opportunity, RiskTier};
use crate::llm::AdvisoryInput;

/// Opportunities beyond this many are left out of the prompt.
pub const MAX_PROMPT_OPPORTUNITIES: usize = 20;

pub fn system_prompt() -> String {
    [
        "You are a DeFi yield analyst. Create a personalized portfolio recommendation.",
        "Return ONLY valid JSON. Do not wrap in markdown.",
        "No trailing commas. No comments. Use double quotes for all JSON strings.",
        "Use only the provided opportunities (pool_id/project/symbol).",
    ]
    .join("\n")
}

fn output_schema() -> String {
    [
        "{",
        "  \"allocations\": [",
        "    {",
        "      \"pool_id\": \"string\",",
        "      \"project\": \"string\",",
        "      \"chain\": \"string\",",
        "      \"symbol\": \"string\",",
        "      \"allocation_percentage\": 0.0,",
        "      \"allocation_usd\": 0.0,",
        "      \"expected_apy\": 0.0,",
        "      \"risk_tier\": \"A|B|C|D\",",
        "      \"reasoning\": \"string\"",
        "    }",
        "  ],",
        "  \"total_allocated_usd\": 0.0,",
        "  \"weighted_expected_apy\": 0.0,",
        "  \"overall_risk_grade\": \"A|B+|B|B-|C|C-\",",
        "  \"diversification_score\": 0.0,",
        "  \"summary\": \"string\",",
        "  \"key_risks\": [\"string\"],",
        "  \"opportunities\": [\"string\"],",
        "  \"rationale\": \"string\",",
        "  \"projected_returns\": {\"1d\": 0.0, \"7d\": 0.0, \"30d\": 0.0, \"365d\": 0.0},",
        "  \"estimated_fees\": {\"bridge\": 0.0, \"swap\": 0.0, \"gas\": 0.0},",
        "  \"confidence_score\": 0.0",
        "}",
    ]
    .join("\n")
}

pub fn user_prompt(input: &AdvisoryInput) -> String {
    let chains = match input.preferred_chains.as_deref() {
        Some(chains) if !chains.is_empty() => chains.join(", "),
        _ => "Any".to_string(),
    };
    let liquidity = match input.min_liquidity_usd {
        Some(v) if v > 0.0 => format!("${}", group_thousands(v, 0)),
        _ => "No minimum".to_string(),
    };

    let mut lines = vec![
        "USER CONTEXT:".to_string(),
        format!("- Amount: ${} USD", group_thousands(input.amount_usd, 2)),
        format!("- Risk: {}", input.risk_tolerance.as_str()),
        format!("- Chains: {chains}"),
        format!("- Min Liquidity: {liquidity}"),
        String::new(),
        "Market Risk Distribution:".to_string(),
    ];
    for tier in RiskTier::ALL {
        let m = input.risk_distribution.metric(tier);
        lines.push(format!("- Tier {tier}: {}% ({} pools)", m.percentage, m.count));
    }
    lines.push(format!("- Overall: {}", input.risk_distribution.grade));
    lines.push(String::new());

    lines.push(format!(
        "OPPORTUNITIES ({} available):",
        input.opportunities.len()
    ));
    let listed: Vec<String> = input
        .opportunities
        .iter()
        .take(MAX_PROMPT_OPPORTUNITIES)
        .enumerate()
        .map(|(i, opp)| format_opportunity(i + 1, opp))
        .collect();
    lines.push(listed.join("\n\n"));
    lines.push(String::new());

    lines.extend(
        [
            "REQUIREMENTS:",
            "1. Recommend 3-5 allocations totaling 100% of capital",
            "2. Diversify across protocols, chains, risk tiers, and asset types",
            "3. Match risk tolerance - explain rationale for each allocation",
            "4. Calculate projected returns (1d, 7d, 30d, 365d in USD)",
            "5. Estimate fees (bridge, swap, gas)",
            "6. Provide executive summary, top 3 risks, top 3 opportunities",
            "7. Rate confidence 0-100",
            "",
            "OUTPUT SCHEMA:",
        ]
        .map(String::from),
    );
    lines.push(output_schema());

    lines.join("\n")
}

fn format_opportunity(n: usize, opp: &Opportunity) -> String {
    let tier = opp.risk_tier.map(|t| t.as_str()).unwrap_or("N/A");
    let prediction = match (&opp.predicted_class, opp.predicted_probability) {
        (Some(class), Some(p)) => format!("{class} ({p}% confidence)"),
        (Some(class), None) => class.clone(),
        _ => "none".to_string(),
    };
    [
        format!("{n}. {} - {} ({})", opp.project, opp.symbol, opp.chain),
        format!(
            "   - Pool: {}",
            opp.pool_id.as_deref().unwrap_or("unknown")
        ),
        format!(
            "   - APY: {:.2}% (Base: {:.2}%, Reward: {:.2}%)",
            opp.apy.unwrap_or(0.0),
            opp.apy_base.unwrap_or(0.0),
            opp.apy_reward.unwrap_or(0.0)
        ),
        format!(
            "   - TVL: ${} USD",
            group_thousands(opp.tvl_usd.unwrap_or(0.0), 0)
        ),
        format!(
            "   - Risk Tier: {tier} (Score: {:.2})",
            opp.risk_score.unwrap_or(0.0)
        ),
        format!("   - Stablecoin: {}", opp.stablecoin.unwrap_or(false)),
        format!(
            "   - IL Risk: {}",
            opp.il_risk.as_deref().unwrap_or("unknown")
        ),
        format!(
            "   - Exposure: {}",
            opp.exposure.as_deref().unwrap_or("unknown")
        ),
        format!("   - Prediction: {prediction}"),
        format!(
            "   - Volatility: {:.2}% (7d change)",
            opp.apy_pct_7d.unwrap_or(0.0).abs()
        ),
    ]
    .join("\n")
}

/// `1234567.891` with 2 decimals becomes `"1,234,567.89"`.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac {
        out.push('.');
        out.push_str(frac);
    }
    out
}
