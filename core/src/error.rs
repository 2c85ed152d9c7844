use thiserror::Error;

use crate::{
    cases::StrStatus,
    types::{CaseId, NodeId, RuleId, TransactionId},
};

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("No risk profile for '{key}'")]
    ProfileNotFound { key: String },

    #[error("STR {existing_case_id} already exists for transaction {transaction_id}")]
    DuplicateCase {
        transaction_id:   TransactionId,
        existing_case_id: CaseId,
    },

    #[error("Case {case_id} cannot move from {from} to {to}")]
    InvalidTransition {
        case_id: CaseId,
        from:    StrStatus,
        to:      StrStatus,
    },

    #[error("Case '{case_id}' not found")]
    CaseNotFound { case_id: CaseId },

    #[error("Rule '{rule_id}' not found")]
    RuleNotFound { rule_id: RuleId },

    #[error("Rule '{rule_id}' has no parameter '{key}'")]
    UnknownParameter { rule_id: RuleId, key: String },

    #[error("Rule '{rule_id}' parameter '{key}' expects a {expected} value")]
    ParameterTypeMismatch {
        rule_id:  RuleId,
        key:      String,
        expected: &'static str,
    },

    #[error("Duplicate rule id '{rule_id}' in seed set")]
    DuplicateRule { rule_id: RuleId },

    #[error("Engine node '{node_id}' not found")]
    NodeNotFound { node_id: NodeId },

    #[error("Invalid engine node: {reason}")]
    InvalidNode { reason: String },

    #[error("Node '{node_id}' call failed: {reason}")]
    Remote { node_id: NodeId, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConsoleError {
    /// Duplicate case attempts are an expected outcome, not a failure.
    pub fn is_duplicate_case(&self) -> bool {
        matches!(self, ConsoleError::DuplicateCase { .. })
    }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
