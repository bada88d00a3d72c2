//! Rewrites a loosely shaped advisory payload into [`AdvisoryPayload`].
//!
//! Field-name drift is handled by two fixed tables, one for the top level and one for
//! allocation entries. Every incoming key is looked up once: canonical names map to
//! themselves, known aliases map to their canonical field, anything else is dropped.
//! When a canonical key and an alias carry the same field, the canonical value wins.

use crate::config::DEFAULT_RISK_GRADE;
use crate::domain::contract::{AdvisoryAllocation, AdvisoryPayload, SchemaWarning};
use crate::error::EngineError;
use crate::llm::json::json_type_name;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Wrapper keys that hold the entire recommendation object.
pub const ENVELOPE_KEYS: &[&str] = &[
    "portfolio_recommendation",
    "recommendation",
    "portfolio",
    "result",
    "response",
    "data",
];

const MAX_ENVELOPE_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadField {
    Allocations,
    TotalAllocatedUsd,
    WeightedExpectedApy,
    OverallRiskGrade,
    DiversificationScore,
    Summary,
    KeyRisks,
    Opportunities,
    Rationale,
    ProjectedReturns,
    EstimatedFees,
    ConfidenceScore,
}

pub const TOP_LEVEL_RENAMES: &[(&str, PayloadField)] = &[
    ("executive_summary", PayloadField::Summary),
    ("portfolio_summary", PayloadField::Summary),
    ("overview", PayloadField::Summary),
    ("top_risks", PayloadField::KeyRisks),
    ("risks", PayloadField::KeyRisks),
    ("risk_factors", PayloadField::KeyRisks),
    ("top_opportunities", PayloadField::Opportunities),
    ("key_opportunities", PayloadField::Opportunities),
    ("highlights", PayloadField::Opportunities),
    ("confidence_level", PayloadField::ConfidenceScore),
    ("confidence", PayloadField::ConfidenceScore),
    ("portfolio_allocations", PayloadField::Allocations),
    ("recommended_allocations", PayloadField::Allocations),
    ("positions", PayloadField::Allocations),
    ("total_allocation_usd", PayloadField::TotalAllocatedUsd),
    ("total_amount_usd", PayloadField::TotalAllocatedUsd),
    ("total_usd", PayloadField::TotalAllocatedUsd),
    ("weighted_apy", PayloadField::WeightedExpectedApy),
    ("portfolio_apy", PayloadField::WeightedExpectedApy),
    ("expected_portfolio_apy", PayloadField::WeightedExpectedApy),
    ("risk_grade", PayloadField::OverallRiskGrade),
    ("portfolio_risk_grade", PayloadField::OverallRiskGrade),
    ("diversification", PayloadField::DiversificationScore),
    ("strategy_rationale", PayloadField::Rationale),
    ("strategy", PayloadField::Rationale),
    ("projected_return", PayloadField::ProjectedReturns),
    ("return_projections", PayloadField::ProjectedReturns),
    ("fees", PayloadField::EstimatedFees),
    ("estimated_costs", PayloadField::EstimatedFees),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationField {
    PoolId,
    Project,
    Symbol,
    Chain,
    AllocationPercentage,
    AllocationUsd,
    ExpectedApy,
    RiskTier,
    Reasoning,
}

pub const ALLOCATION_RENAMES: &[(&str, AllocationField)] = &[
    ("protocol", AllocationField::Project),
    ("protocol_name", AllocationField::Project),
    ("project_name", AllocationField::Project),
    ("asset", AllocationField::Symbol),
    ("token", AllocationField::Symbol),
    ("asset_symbol", AllocationField::Symbol),
    ("pool", AllocationField::PoolId),
    ("pool_address", AllocationField::PoolId),
    ("network", AllocationField::Chain),
    ("blockchain", AllocationField::Chain),
    ("amount", AllocationField::AllocationUsd),
    ("amount_usd", AllocationField::AllocationUsd),
    ("usd_amount", AllocationField::AllocationUsd),
    ("allocation_amount", AllocationField::AllocationUsd),
    ("percentage", AllocationField::AllocationPercentage),
    ("percent", AllocationField::AllocationPercentage),
    ("allocation_pct", AllocationField::AllocationPercentage),
    ("weight", AllocationField::AllocationPercentage),
    ("apy", AllocationField::ExpectedApy),
    ("expected_yield", AllocationField::ExpectedApy),
    ("projected_apy", AllocationField::ExpectedApy),
    ("tier", AllocationField::RiskTier),
    ("risk", AllocationField::RiskTier),
    ("risk_level", AllocationField::RiskTier),
    ("rationale", AllocationField::Reasoning),
    ("reason", AllocationField::Reasoning),
    ("explanation", AllocationField::Reasoning),
];

trait CanonicalField: Copy + Eq + Hash + 'static {
    const ALL: &'static [Self];
    const RENAMES: &'static [(&'static str, Self)];

    fn key(self) -> &'static str;

    /// Absence is reported as a schema warning.
    fn expected(self) -> bool {
        true
    }

    fn resolve(key: &str) -> Option<(Self, bool)> {
        let key = normalize_key(key);
        if let Some(field) = Self::ALL.iter().copied().find(|f| f.key() == key) {
            return Some((field, true));
        }
        Self::RENAMES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|&(_, field)| (field, false))
    }
}

impl CanonicalField for PayloadField {
    const ALL: &'static [Self] = &[
        PayloadField::Allocations,
        PayloadField::TotalAllocatedUsd,
        PayloadField::WeightedExpectedApy,
        PayloadField::OverallRiskGrade,
        PayloadField::DiversificationScore,
        PayloadField::Summary,
        PayloadField::KeyRisks,
        PayloadField::Opportunities,
        PayloadField::Rationale,
        PayloadField::ProjectedReturns,
        PayloadField::EstimatedFees,
        PayloadField::ConfidenceScore,
    ];
    const RENAMES: &'static [(&'static str, Self)] = TOP_LEVEL_RENAMES;

    fn key(self) -> &'static str {
        match self {
            PayloadField::Allocations => "allocations",
            PayloadField::TotalAllocatedUsd => "total_allocated_usd",
            PayloadField::WeightedExpectedApy => "weighted_expected_apy",
            PayloadField::OverallRiskGrade => "overall_risk_grade",
            PayloadField::DiversificationScore => "diversification_score",
            PayloadField::Summary => "summary",
            PayloadField::KeyRisks => "key_risks",
            PayloadField::Opportunities => "opportunities",
            PayloadField::Rationale => "rationale",
            PayloadField::ProjectedReturns => "projected_returns",
            PayloadField::EstimatedFees => "estimated_fees",
            PayloadField::ConfidenceScore => "confidence_score",
        }
    }
}

impl CanonicalField for AllocationField {
    const ALL: &'static [Self] = &[
        AllocationField::PoolId,
        AllocationField::Project,
        AllocationField::Symbol,
        AllocationField::Chain,
        AllocationField::AllocationPercentage,
        AllocationField::AllocationUsd,
        AllocationField::ExpectedApy,
        AllocationField::RiskTier,
        AllocationField::Reasoning,
    ];
    const RENAMES: &'static [(&'static str, Self)] = ALLOCATION_RENAMES;

    fn key(self) -> &'static str {
        match self {
            AllocationField::PoolId => "pool_id",
            AllocationField::Project => "project",
            AllocationField::Symbol => "symbol",
            AllocationField::Chain => "chain",
            AllocationField::AllocationPercentage => "allocation_percentage",
            AllocationField::AllocationUsd => "allocation_usd",
            AllocationField::ExpectedApy => "expected_apy",
            AllocationField::RiskTier => "risk_tier",
            AllocationField::Reasoning => "reasoning",
        }
    }

    fn expected(self) -> bool {
        !matches!(
            self,
            AllocationField::PoolId | AllocationField::Chain | AllocationField::RiskTier
        )
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// `overall_risk_grade` when the payload carries none.
    pub default_risk_grade: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            default_risk_grade: DEFAULT_RISK_GRADE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub payload: AdvisoryPayload,
    pub warnings: Vec<SchemaWarning>,
}

pub fn normalize(raw: Value) -> Result<Normalized, EngineError> {
    normalize_with(raw, &NormalizeOptions::default())
}

pub fn normalize_with(raw: Value, options: &NormalizeOptions) -> Result<Normalized, EngineError> {
    let map = match raw {
        Value::Object(map) => map,
        other => {
            return Err(EngineError::malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let map = unwrap_envelope(map);
    let mut warnings = Vec::new();
    let mut top = FieldReader::new(rename::<PayloadField>(map, ""), String::new(), &mut warnings);

    let mut allocations = Vec::new();
    match top.raw(PayloadField::Allocations) {
        Some(Value::Array(items)) => {
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(entry) => {
                        allocations.push(normalize_allocation(entry, index, top.warnings));
                    }
                    other => top.warnings.push(SchemaWarning::new(
                        format!("allocations[{index}]"),
                        format!("expected an object, got {}; entry dropped", json_type_name(&other)),
                    )),
                }
            }
        }
        Some(other) => top.mismatch(PayloadField::Allocations, &other),
        None => {}
    }

    let total_allocated_usd = top
        .number(PayloadField::TotalAllocatedUsd)
        .unwrap_or_else(|| allocations.iter().map(|a| a.allocation_usd).sum());

    let weighted_expected_apy = top
        .number(PayloadField::WeightedExpectedApy)
        .unwrap_or_else(|| {
            if total_allocated_usd > 0.0 {
                allocations
                    .iter()
                    .map(|a| a.allocation_usd * a.expected_apy)
                    .sum::<f64>()
                    / total_allocated_usd
            } else {
                0.0
            }
        });

    let overall_risk_grade = top
        .text(PayloadField::OverallRiskGrade)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| options.default_risk_grade.clone());

    let diversification_score = top
        .number(PayloadField::DiversificationScore)
        .unwrap_or_else(|| (allocations.len() as f64 * 20.0).min(100.0));

    let summary = top.text(PayloadField::Summary).unwrap_or_default();
    let rationale = top
        .text(PayloadField::Rationale)
        .unwrap_or_else(|| summary.clone());

    let payload = AdvisoryPayload {
        total_allocated_usd,
        weighted_expected_apy,
        overall_risk_grade,
        diversification_score,
        key_risks: top.text_list(PayloadField::KeyRisks).unwrap_or_default(),
        opportunities: top.text_list(PayloadField::Opportunities).unwrap_or_default(),
        projected_returns: top.number_map(PayloadField::ProjectedReturns).unwrap_or_default(),
        estimated_fees: top.number_map(PayloadField::EstimatedFees).unwrap_or_default(),
        confidence_score: top.number(PayloadField::ConfidenceScore).unwrap_or(0.0),
        summary,
        rationale,
        allocations,
    };

    Ok(Normalized { payload, warnings })
}

fn normalize_allocation(
    entry: Map<String, Value>,
    index: usize,
    warnings: &mut Vec<SchemaWarning>,
) -> AdvisoryAllocation {
    let scope = format!("allocations[{index}].");
    let mut r = FieldReader::new(rename::<AllocationField>(entry, &scope), scope, warnings);

    let project = r.text(AllocationField::Project).unwrap_or_default();
    let symbol = r.text(AllocationField::Symbol).unwrap_or_default();
    let pool_id = r
        .text(AllocationField::PoolId)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("{project}-{symbol}"));

    AdvisoryAllocation {
        pool_id,
        chain: r.text(AllocationField::Chain),
        allocation_percentage: r.number(AllocationField::AllocationPercentage).unwrap_or(0.0),
        allocation_usd: r.number(AllocationField::AllocationUsd).unwrap_or(0.0),
        expected_apy: r.number(AllocationField::ExpectedApy).unwrap_or(0.0),
        risk_tier: r.text(AllocationField::RiskTier),
        reasoning: r.text(AllocationField::Reasoning).unwrap_or_default(),
        project,
        symbol,
    }
}

/// Replaces the payload with the object under its single envelope key, repeatedly, as long
/// as the payload has no allocations of its own.
fn unwrap_envelope(mut map: Map<String, Value>) -> Map<String, Value> {
    for _ in 0..MAX_ENVELOPE_DEPTH {
        let has_allocations = map.keys().any(|k| {
            matches!(
                PayloadField::resolve(k),
                Some((PayloadField::Allocations, _))
            )
        });
        if has_allocations {
            break;
        }

        let envelopes: Vec<String> = map
            .iter()
            .filter(|(k, v)| v.is_object() && ENVELOPE_KEYS.contains(&normalize_key(k).as_str()))
            .map(|(k, _)| k.clone())
            .collect();
        let [key] = envelopes.as_slice() else {
            break;
        };

        match map.remove(key) {
            Some(Value::Object(inner)) => {
                tracing::debug!(envelope = %key, "unwrapped advisory payload envelope");
                map = inner;
            }
            _ => break,
        }
    }
    map
}

fn rename<F: CanonicalField>(map: Map<String, Value>, scope: &str) -> HashMap<F, Value> {
    let mut fields = HashMap::with_capacity(map.len());
    for (key, value) in map {
        match F::resolve(&key) {
            Some((field, true)) => {
                fields.insert(field, value);
            }
            Some((field, false)) => {
                fields.entry(field).or_insert(value);
            }
            None => {
                tracing::debug!(field = %format!("{scope}{key}"), "dropping unknown advisory field");
            }
        }
    }
    fields
}

/// `"Executive Summary"`, `"executive-summary"` and `"executiveSummary"` all become
/// `"executive_summary"`.
fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.trim().chars() {
        if ch == ' ' || ch == '-' {
            out.push('_');
            prev_lower = false;
        } else if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

struct FieldReader<'w, F> {
    fields: HashMap<F, Value>,
    scope: String,
    warnings: &'w mut Vec<SchemaWarning>,
}

impl<'w, F: CanonicalField> FieldReader<'w, F> {
    fn new(fields: HashMap<F, Value>, scope: String, warnings: &'w mut Vec<SchemaWarning>) -> Self {
        Self {
            fields,
            scope,
            warnings,
        }
    }

    fn path(&self, field: F) -> String {
        format!("{}{}", self.scope, field.key())
    }

    fn warn(&mut self, path: String, detail: String) {
        self.warnings.push(SchemaWarning::new(path, detail));
    }

    fn mismatch(&mut self, field: F, got: &Value) {
        let path = self.path(field);
        self.warn(
            path,
            format!("unexpected type {}; using default", json_type_name(got)),
        );
    }

    /// Removes the field; `null` counts as absent.
    fn raw(&mut self, field: F) -> Option<Value> {
        let value = self.fields.remove(&field).filter(|v| !v.is_null());
        if value.is_none() && field.expected() {
            let path = self.path(field);
            self.warn(path, "missing; using default".to_string());
        }
        value
    }

    fn number(&mut self, field: F) -> Option<f64> {
        let value = self.raw(field)?;
        let n = coerce_number(&value);
        if n.is_none() {
            self.mismatch(field, &value);
        }
        n
    }

    fn text(&mut self, field: F) -> Option<String> {
        match self.raw(field)? {
            Value::String(s) => Some(s),
            v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
            other => {
                self.mismatch(field, &other);
                None
            }
        }
    }

    fn text_list(&mut self, field: F) -> Option<Vec<String>> {
        match self.raw(field)? {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(s),
                        v @ (Value::Number(_) | Value::Bool(_)) => out.push(v.to_string()),
                        other => {
                            let path = format!("{}[{i}]", self.path(field));
                            self.warn(
                                path,
                                format!("unexpected type {}; skipped", json_type_name(&other)),
                            );
                        }
                    }
                }
                Some(out)
            }
            Value::String(s) => Some(vec![s]),
            other => {
                self.mismatch(field, &other);
                None
            }
        }
    }

    fn number_map(&mut self, field: F) -> Option<BTreeMap<String, f64>> {
        match self.raw(field)? {
            Value::Object(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    match coerce_number(&v) {
                        Some(n) => {
                            out.insert(k, n);
                        }
                        None => {
                            let path = format!("{}.{k}", self.path(field));
                            self.warn(
                                path,
                                format!("unexpected type {}; skipped", json_type_name(&v)),
                            );
                        }
                    }
                }
                Some(out)
            }
            other => {
                self.mismatch(field, &other);
                None
            }
        }
    }
}

/// Numbers, or strings such as `"50"`, `"4.5%"`, `"$1,200"`.
fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .trim_end_matches('%')
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite()),
        _ => None,
    }
}
