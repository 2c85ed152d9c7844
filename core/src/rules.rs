//! Analysis rule configuration registry.
//!
//! RULES:
//!   - Rules are seeded once at start-up and never deleted.
//!   - Parameter keys and value types are fixed by the seed. Edits may
//!     change values only.
//!   - A rejected edit leaves the registry untouched.

use crate::{
    error::{ConsoleError, ConsoleResult},
    types::RuleId,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisCategory {
    Customer,
    Transaction,
}

/// Detection methods known to the analysis engine. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisMethod {
    PeerGroup,
    TimeSeriesGap,
    KycIntegrity,
    CustomerRiskScore,
    SanctionMatch,
    TimeWindowAggregation,
    VarianceAnalysis,
    ZScore,
    FrequencyAnalysis,
    TurnoverRatio,
    BenfordLaw,
    RoundNumber,
    GeoRisk,
}

impl AnalysisMethod {
    /// Switch name in the engine's `Data_Analysis_Configurations` block.
    /// Methods without an engine switch return `None`.
    pub fn engine_switch(self) -> Option<(AnalysisCategory, &'static str)> {
        use AnalysisCategory::*;
        match self {
            AnalysisMethod::PeerGroup         => Some((Customer, "Peer_Group_Analysis")),
            AnalysisMethod::TimeSeriesGap     => Some((Customer, "Time_Gap_Analysis")),
            AnalysisMethod::KycIntegrity      => Some((Customer, "KYC_Integrity_Check")),
            AnalysisMethod::CustomerRiskScore => Some((Customer, "Anomaly_Detection")),
            AnalysisMethod::SanctionMatch     => Some((Customer, "Sanctions_List_Check")),
            AnalysisMethod::ZScore            => Some((Transaction, "Transaction_Amount_Analysis")),
            AnalysisMethod::FrequencyAnalysis => Some((Transaction, "Transaction_Frequency_Analysis")),
            AnalysisMethod::TurnoverRatio     => Some((Transaction, "Transaction_Turnover_Analysis")),
            AnalysisMethod::BenfordLaw        => Some((Transaction, "BrentFord_Digit_Analysis")),
            AnalysisMethod::RoundNumber       => Some((Transaction, "Round_Number_Hoarding_Analysis")),
            AnalysisMethod::GeoRisk           => Some((Transaction, "Transaction_Geographic_Analysis")),
            AnalysisMethod::TimeWindowAggregation | AnalysisMethod::VarianceAnalysis => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A rule parameter value. The variant chosen at seeding is the type
/// every later edit must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_)   => "boolean",
            ParamValue::Number(_) => "number",
            ParamValue::Text(_)   => "string",
        }
    }

    pub fn same_type(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b)   => write!(f, "{b}"),
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Text(s)   => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRule {
    pub id:          RuleId,
    pub category:    AnalysisCategory,
    pub method:      AnalysisMethod,
    pub name:        String,
    pub description: String,
    pub enabled:     bool,
    pub severity:    Severity,
    pub parameters:  BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RulesFile {
    pub rules: Vec<AnalysisRule>,
}

/// Engine-facing view of which analyses are switched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(rename = "Transaction_Related_Analysis")]
    pub transaction: BTreeMap<String, String>,
    #[serde(rename = "Customer_Related_Analysis")]
    pub customer: BTreeMap<String, String>,
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<AnalysisRule>,
}

impl RuleRegistry {
    /// Seed from an explicit rule set. Ids must be unique.
    pub fn new(rules: Vec<AnalysisRule>) -> ConsoleResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConsoleError::DuplicateRule { rule_id: rule.id.clone() });
            }
        }
        log::info!("Rule registry seeded with {} rules", rules.len());
        Ok(Self { rules })
    }

    /// The built-in seed set used when no rules file is configured.
    pub fn with_defaults() -> Self {
        Self { rules: default_rules() }
    }

    /// Rules in seed order, optionally restricted to one category.
    pub fn list(&self, category: Option<AnalysisCategory>) -> Vec<&AnalysisRule> {
        self.rules
            .iter()
            .filter(|r| category.map_or(true, |c| r.category == c))
            .collect()
    }

    pub fn get(&self, rule_id: &str) -> ConsoleResult<&AnalysisRule> {
        self.rules
            .iter()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| ConsoleError::RuleNotFound { rule_id: rule_id.to_string() })
    }

    fn get_mut(&mut self, rule_id: &str) -> ConsoleResult<&mut AnalysisRule> {
        self.rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| ConsoleError::RuleNotFound { rule_id: rule_id.to_string() })
    }

    /// Flip `enabled`. Returns the new value.
    pub fn toggle(&mut self, rule_id: &str) -> ConsoleResult<bool> {
        let rule = self.get_mut(rule_id)?;
        rule.enabled = !rule.enabled;
        log::info!("Rule {} {}", rule.id, if rule.enabled { "enabled" } else { "disabled" });
        Ok(rule.enabled)
    }

    /// Replace one parameter value. Returns the previous value.
    pub fn set_parameter(&mut self, rule_id: &str, key: &str, value: ParamValue) -> ConsoleResult<ParamValue> {
        let rule = self.get_mut(rule_id)?;
        let slot = rule
            .parameters
            .get_mut(key)
            .ok_or_else(|| ConsoleError::UnknownParameter {
                rule_id: rule_id.to_string(),
                key:     key.to_string(),
            })?;
        if !slot.same_type(&value) {
            return Err(ConsoleError::ParameterTypeMismatch {
                rule_id:  rule_id.to_string(),
                key:      key.to_string(),
                expected: slot.type_name(),
            });
        }
        log::info!("Rule {rule_id} parameter {key}: {slot} -> {value}");
        Ok(std::mem::replace(slot, value))
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Full copy of every rule, for dumps.
    pub fn snapshot(&self) -> Vec<AnalysisRule> {
        self.rules.clone()
    }

    /// Engine switches derived from the current rules. A switch is on if
    /// any rule mapped to it is enabled.
    pub fn analysis_settings(&self) -> AnalysisSettings {
        let mut settings = AnalysisSettings {
            transaction: BTreeMap::new(),
            customer:    BTreeMap::new(),
        };
        for rule in &self.rules {
            let Some((category, switch)) = rule.method.engine_switch() else {
                continue;
            };
            let block = match category {
                AnalysisCategory::Transaction => &mut settings.transaction,
                AnalysisCategory::Customer    => &mut settings.customer,
            };
            let on = block.get(switch).map_or(false, |v| v == "true") || rule.enabled;
            block.insert(switch.to_string(), on.to_string());
        }
        settings
    }
}

fn params<const N: usize>(pairs: [(&str, ParamValue); N]) -> BTreeMap<String, ParamValue> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn default_rules() -> Vec<AnalysisRule> {
    vec![
        AnalysisRule {
            id:          "c1".into(),
            category:    AnalysisCategory::Customer,
            method:      AnalysisMethod::PeerGroup,
            name:        "Peer Group Deviation".into(),
            description: "Detects outliers within occupation/region peer groups.".into(),
            enabled:     true,
            severity:    Severity::Medium,
            parameters:  params([
                ("deviationThreshold", 2.5.into()),
                ("minPeerSize", 50.0.into()),
            ]),
        },
        AnalysisRule {
            id:          "c2".into(),
            category:    AnalysisCategory::Customer,
            method:      AnalysisMethod::TimeSeriesGap,
            name:        "Zombie Account Activation".into(),
            description: "Flags sudden activity after long dormancy.".into(),
            enabled:     true,
            severity:    Severity::High,
            parameters:  params([
                ("dormancyDays", 180.0.into()),
                ("activationAmount", 5000.0.into()),
            ]),
        },
        AnalysisRule {
            id:          "t1".into(),
            category:    AnalysisCategory::Transaction,
            method:      AnalysisMethod::ZScore,
            name:        "Statistical Outlier (Z-Score)".into(),
            description: "Standard deviation analysis for individual transaction amounts.".into(),
            enabled:     true,
            severity:    Severity::Medium,
            parameters:  params([
                ("zScoreThreshold", 3.0.into()),
                ("lookbackPeriodDays", 90.0.into()),
            ]),
        },
        AnalysisRule {
            id:          "t2".into(),
            category:    AnalysisCategory::Transaction,
            method:      AnalysisMethod::BenfordLaw,
            name:        "Benford's Law Analysis".into(),
            description: "Analyzes first-digit distribution to detect artificial numbers.".into(),
            enabled:     false,
            severity:    Severity::Low,
            parameters:  params([
                ("confidenceLevel", 95.0.into()),
                ("minTransactionCount", 100.0.into()),
            ]),
        },
        AnalysisRule {
            id:          "t3".into(),
            category:    AnalysisCategory::Transaction,
            method:      AnalysisMethod::RoundNumber,
            name:        "Round Number Hoarding".into(),
            description: "Detects excessive frequency of round amounts (e.g., 10,000).".into(),
            enabled:     true,
            severity:    Severity::Medium,
            parameters:  params([("thresholdPercentage", 15.0.into())]),
        },
    ]
}
