//! Read-only risk profiles produced by the upstream analysis engine.
//!
//! Profiles are never mutated here. Analysis blobs arrive as text written
//! by the engine, often as Python literals rather than JSON; they are kept
//! verbatim and decoded on demand with `parse_loose_json`.

use crate::{
    risk_band::{classify, RiskBand},
    types::ProfileKind,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Common read-side view over transaction and customer profiles.
pub trait RiskProfile {
    fn kind(&self) -> ProfileKind;

    /// Stable identifier used for display and case linking.
    fn profile_key(&self) -> String;

    fn risk_score(&self) -> Option<f64>;

    /// Display band. Always derived through `classify`, never from the
    /// stored `risk_level` column, so it matches the query filter.
    fn band(&self) -> Option<RiskBand> {
        self.risk_score().map(classify)
    }

    /// Machine-generated flags attached by the engine.
    fn reason_codes(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRiskProfile {
    pub id: i64,
    pub transaction_id: String,
    pub from_account: String,
    pub from_name: String,
    pub to_account: String,
    pub to_name: String,
    pub amount: f64,
    pub transaction_type: String,
    pub transaction_time: String,
    pub frequency_1hr: i64,
    pub frequency_24hr: i64,
    pub frequency_7days: i64,
    pub time_window_1hr: f64,
    pub time_window_24hr: f64,
    pub time_window_7days: f64,
    pub variance_24hr: f64,
    pub variance_7days: f64,
    pub z_score_individual: f64,
    pub z_score_branch: f64,
    pub z_score_population: f64,
    pub percentile_branch: f64,
    pub percentile_transaction_type: f64,
    pub turnover_ratio_24hr: f64,
    pub turnover_ratio_7days: f64,
    pub leading_digit_distribution: String,
    pub round_number_hoarding: f64,
    pub transaction_geography_risk: f64,
    pub overall_risk_score: Option<f64>,
    pub risk_level: Option<String>,
    pub reason_codes: Option<String>,
    pub generated_at: String,
}

impl RiskProfile for TransactionRiskProfile {
    fn kind(&self) -> ProfileKind {
        ProfileKind::Transaction
    }

    fn profile_key(&self) -> String {
        self.transaction_id.clone()
    }

    fn risk_score(&self) -> Option<f64> {
        self.overall_risk_score
    }

    fn reason_codes(&self) -> Vec<String> {
        self.reason_codes
            .as_deref()
            .map(parse_reason_codes)
            .unwrap_or_default()
    }
}

/// Field aliases accept the upper-case column names the engine writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRiskProfile {
    #[serde(alias = "Profile_ID")]
    pub profile_id: i64,
    #[serde(alias = "Customer_ID", default, deserialize_with = "id_as_string")]
    pub customer_id: Option<String>,
    #[serde(alias = "Account_No")]
    pub account_no: String,
    #[serde(alias = "Full_Name")]
    pub full_name: String,
    #[serde(alias = "PEER_PROFILE_OCCUPATION")]
    pub peer_profile_occupation: Option<String>,
    #[serde(alias = "PEER_PROFILE_REGION")]
    pub peer_profile_region: Option<String>,
    #[serde(alias = "PEER_PROFILE_ACCOUNT_AGE")]
    pub peer_profile_account_age: Option<String>,
    #[serde(alias = "TIME_SERIES_GAP")]
    pub time_series_gap: Option<String>,
    #[serde(alias = "KYC_INTEGRITY_UNIQUENESS")]
    pub kyc_integrity_uniqueness: Option<String>,
    #[serde(alias = "KYC_INTEGRITY_COMPLETENESS_RATIO")]
    pub kyc_integrity_completeness_ratio: f64,
    #[serde(alias = "DEMOGRAPHICS_RISK")]
    pub demographics_risk: Option<String>,
    #[serde(alias = "SANCTION_HITS")]
    pub sanction_hits: Option<String>,
    #[serde(alias = "WATCHLIST_HITS")]
    pub watchlist_hits: Option<String>,
    #[serde(alias = "PEP_HITS")]
    pub pep_hits: Option<String>,
    #[serde(alias = "RISK_SCORE")]
    pub risk_score: Option<f64>,
    #[serde(alias = "RISK_LEVEL")]
    pub risk_level: Option<String>,
    #[serde(alias = "REVIEW_FREQUENCY_DAYS")]
    pub review_frequency_days: i64,
    #[serde(alias = "LAST_REVIEW_DATE")]
    pub last_review_date: Option<String>,
    #[serde(alias = "NEXT_REVIEW_DATE")]
    pub next_review_date: Option<String>,
    #[serde(alias = "REASON_CODES_JSON")]
    pub reason_codes_json: Option<String>,
    #[serde(alias = "STATUS")]
    pub status: String,
    #[serde(alias = "CREATED_AT")]
    pub created_at: String,
    #[serde(alias = "UPDATED_AT")]
    pub updated_at: Option<String>,
    pub account_age: Option<String>,
    pub occupation: Option<String>,
    pub region: Option<String>,
}

impl CustomerRiskProfile {
    /// Customer id if the engine resolved one, else the account number.
    pub fn customer_key(&self) -> String {
        self.customer_id
            .clone()
            .unwrap_or_else(|| self.account_no.clone())
    }

    pub fn sanction_hits(&self) -> Option<serde_json::Value> {
        self.sanction_hits.as_deref().and_then(parse_loose_json)
    }

    pub fn watchlist_hits(&self) -> Option<serde_json::Value> {
        self.watchlist_hits.as_deref().and_then(parse_loose_json)
    }

    pub fn pep_hits(&self) -> Option<serde_json::Value> {
        self.pep_hits.as_deref().and_then(parse_loose_json)
    }

    pub fn peer_profile_occupation(&self) -> Option<serde_json::Value> {
        self.peer_profile_occupation.as_deref().and_then(parse_loose_json)
    }
}

impl RiskProfile for CustomerRiskProfile {
    fn kind(&self) -> ProfileKind {
        ProfileKind::Customer
    }

    fn profile_key(&self) -> String {
        self.customer_key()
    }

    fn risk_score(&self) -> Option<f64> {
        self.risk_score
    }

    fn reason_codes(&self) -> Vec<String> {
        self.reason_codes_json
            .as_deref()
            .map(parse_reason_codes)
            .unwrap_or_default()
    }
}

/// The engine keys customers by integer id; older exports use text.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdValue {
        Number(i64),
        Text(String),
    }

    Ok(Option::<IdValue>::deserialize(deserializer)?.map(|id| match id {
        IdValue::Number(n) => n.to_string(),
        IdValue::Text(s) => s,
    }))
}

// ── Blob decoding ────────────────────────────────────────────────────────────

/// Decode an analysis blob that may be JSON or a Python literal
/// (`'quoted'`, `True`, `False`, `None`). Returns `None` when the text
/// cannot be repaired into JSON.
pub fn parse_loose_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    serde_json::from_str(&repair_python_literal(trimmed)).ok()
}

/// Rewrite Python literal tokens outside of string literals.
fn repair_python_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let mut in_string: Option<char> = None;

    let flush = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True"  => out.push_str("true"),
            "False" => out.push_str("false"),
            "None"  => out.push_str("null"),
            other   => out.push_str(other),
        }
        word.clear();
    };

    for ch in text.chars() {
        match in_string {
            Some(quote) => {
                if ch == quote {
                    in_string = None;
                    out.push('"');
                } else if ch == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(ch);
                }
            }
            None => {
                if ch.is_alphanumeric() || ch == '_' {
                    word.push(ch);
                    continue;
                }
                flush(&mut word, &mut out);
                if ch == '\'' || ch == '"' {
                    in_string = Some(ch);
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Parse engine reason codes. Accepts a JSON or Python list of strings,
/// falling back to a comma-separated list. Entries are trimmed and empty
/// entries dropped.
pub fn parse_reason_codes(text: &str) -> Vec<String> {
    let codes: Vec<String> = match parse_loose_json(text) {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null      => None,
                other                        => Some(other.to_string()),
            })
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s],
        _ => text
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(str::to_string)
            .collect(),
    };

    codes
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
