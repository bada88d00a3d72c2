use crate::domain::opportunity::{Opportunity, RiskTier};

/// Hard constraints. Every supplied constraint must hold; `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConstraints {
    pub min_tvl_usd: Option<f64>,
    pub min_apy: Option<f64>,
    pub max_risk_tier: Option<RiskTier>,
    /// Case-insensitive chain allow-list. An empty list is treated as no constraint.
    pub chains: Option<Vec<String>>,
}

impl FilterConstraints {
    pub fn matches(&self, opp: &Opportunity) -> bool {
        // A missing field always fails the constraint that tests it.
        if let Some(min) = self.min_tvl_usd {
            if !opp.tvl_usd.is_some_and(|tvl| tvl >= min) {
                return false;
            }
        }

        if let Some(min) = self.min_apy {
            if !opp.apy.is_some_and(|apy| apy >= min) {
                return false;
            }
        }

        if let Some(max) = self.max_risk_tier {
            if !opp.risk_tier.is_some_and(|tier| tier <= max) {
                return false;
            }
        }

        if let Some(chains) = self.chains.as_deref().filter(|c| !c.is_empty()) {
            if !chains.iter().any(|c| c.eq_ignore_ascii_case(&opp.chain)) {
                return false;
            }
        }

        true
    }
}

/// Stable filter: keeps input order, never errors. An empty result is a valid answer.
pub fn apply(opportunities: &[Opportunity], constraints: &FilterConstraints) -> Vec<Opportunity> {
    opportunities
        .iter()
        .filter(|opp| constraints.matches(opp))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::scorer::annotate;

    fn pool(project: &str, tvl: Option<f64>, apy: Option<f64>, tier: Option<RiskTier>) -> Opportunity {
        Opportunity {
            tvl_usd: tvl,
            apy,
            risk_tier: tier,
            ..Opportunity::new("Ethereum", project, "USDC")
        }
    }

    fn projects(opps: &[Opportunity]) -> Vec<&str> {
        opps.iter().map(|o| o.project.as_str()).collect()
    }

    #[test]
    fn no_constraints_keeps_everything_in_order() {
        let pools = vec![
            pool("a", None, None, None),
            pool("b", Some(1.0), Some(1.0), Some(RiskTier::D)),
        ];
        let out = apply(&pools, &FilterConstraints::default());
        assert_eq!(projects(&out), vec!["a", "b"]);
    }

    #[test]
    fn missing_fields_fail_their_constraint() {
        let pools = vec![
            pool("no_tvl", None, Some(10.0), Some(RiskTier::A)),
            pool("no_apy", Some(1e6), None, Some(RiskTier::A)),
            pool("no_tier", Some(1e6), Some(10.0), None),
            pool("ok", Some(1e6), Some(10.0), Some(RiskTier::A)),
        ];

        let only_tvl = FilterConstraints {
            min_tvl_usd: Some(0.0),
            ..Default::default()
        };
        assert_eq!(projects(&apply(&pools, &only_tvl)), vec!["no_apy", "no_tier", "ok"]);

        let all = FilterConstraints {
            min_tvl_usd: Some(0.0),
            min_apy: Some(0.0),
            max_risk_tier: Some(RiskTier::D),
            chains: None,
        };
        assert_eq!(projects(&apply(&pools, &all)), vec!["ok"]);
    }

    #[test]
    fn thresholds_are_inclusive_and_combined_with_and() {
        let pools = vec![
            pool("low_tvl", Some(49_999.0), Some(6.0), Some(RiskTier::A)),
            pool("edge", Some(50_000.0), Some(5.0), Some(RiskTier::B)),
            pool("too_risky", Some(90_000.0), Some(9.0), Some(RiskTier::C)),
            pool("low_apy", Some(90_000.0), Some(4.9), Some(RiskTier::A)),
        ];
        let c = FilterConstraints {
            min_tvl_usd: Some(50_000.0),
            min_apy: Some(5.0),
            max_risk_tier: Some(RiskTier::B),
            chains: None,
        };
        assert_eq!(projects(&apply(&pools, &c)), vec!["edge"]);
    }

    #[test]
    fn chain_allow_list_is_case_insensitive() {
        let mut stellar = pool("blend", Some(1.0), Some(1.0), None);
        stellar.chain = "Stellar".to_string();
        let pools = vec![pool("aave", Some(1.0), Some(1.0), None), stellar];

        let c = FilterConstraints {
            chains: Some(vec!["stellar".to_string()]),
            ..Default::default()
        };
        assert_eq!(projects(&apply(&pools, &c)), vec!["blend"]);

        let empty = FilterConstraints {
            chains: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(apply(&pools, &empty).len(), 2);
    }

    #[test]
    fn tier_filter_uses_annotated_tier() {
        let safe = annotate(Opportunity {
            stablecoin: Some(true),
            predicted_class: Some("stable/up".to_string()),
            ..Opportunity::new("Ethereum", "aave", "USDC")
        });
        let unscored = Opportunity::new("Ethereum", "mystery", "ETH");

        let c = FilterConstraints {
            max_risk_tier: Some(RiskTier::A),
            ..Default::default()
        };
        assert_eq!(projects(&apply(&[unscored, safe], &c)), vec!["aave"]);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let c = FilterConstraints {
            min_apy: Some(1_000.0),
            ..Default::default()
        };
        assert!(apply(&[pool("a", None, Some(1.0), None)], &c).is_empty());
    }
}
