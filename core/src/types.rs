//! Shared primitive types used across the console core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a Suspicious Transaction Report.
pub type CaseId = String;

/// Upstream transaction identifier carried on transaction risk profiles.
pub type TransactionId = String;

/// Upstream customer identifier.
pub type CustomerId = String;

/// Stable identifier of an analysis rule.
pub type RuleId = String;

/// Identifier of a remote analysis-engine node.
pub type NodeId = String;

/// Which family of risk profiles a query targets.
///
/// Table and column identifiers used in SQL come only from here,
/// never from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileKind {
    Transaction,
    Customer,
}

impl ProfileKind {
    pub fn table(self) -> &'static str {
        match self {
            ProfileKind::Transaction => "transaction_risk_profiles",
            ProfileKind::Customer    => "customer_risk_profiles",
        }
    }

    /// Column holding the continuous risk score.
    pub fn score_column(self) -> &'static str {
        match self {
            ProfileKind::Transaction => "overall_risk_score",
            ProfileKind::Customer    => "risk_score",
        }
    }

    /// Column used for most-recent-first ordering.
    pub fn recency_column(self) -> &'static str {
        match self {
            ProfileKind::Transaction => "generated_at",
            ProfileKind::Customer    => "created_at",
        }
    }

    /// The two canonical identity columns searched by free text.
    pub fn search_columns(self) -> [&'static str; 2] {
        match self {
            ProfileKind::Transaction => ["from_name", "from_account"],
            ProfileKind::Customer    => ["full_name", "account_no"],
        }
    }

    /// Path segment of the profile endpoints (`/transactions`, `/customers`).
    pub fn endpoint(self) -> &'static str {
        match self {
            ProfileKind::Transaction => "transactions",
            ProfileKind::Customer    => "customers",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Transaction => f.write_str("TRANSACTION"),
            ProfileKind::Customer    => f.write_str("CUSTOMER"),
        }
    }
}
