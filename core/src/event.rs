//! Console events: the audit trail of analyst and operator actions.
//!
//! RULE: Every state change made through `Console` emits exactly one event,
//! and every event is appended to the event log.

use crate::{
    cases::StrStatus,
    nodes::NodeStatus,
    rollout::{ConnectionField, DataSourceType, FieldDataType, NodeOutcome, RolloutAction},
    rules::ParamValue,
    types::{CaseId, CustomerId, NodeId, RuleId, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variants are appended over time; never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleEvent {
    // ── Cases ──────────────────────────────────────
    CaseGenerated {
        case_id: CaseId,
        transaction_id: TransactionId,
        customer_id: CustomerId,
        automatic: bool,
    },
    CaseStatusChanged {
        case_id: CaseId,
        from: StrStatus,
        to: StrStatus,
    },

    // ── Rules ──────────────────────────────────────
    RuleToggled {
        rule_id: RuleId,
        enabled: bool,
    },
    RuleParameterChanged {
        rule_id: RuleId,
        key: String,
        previous: ParamValue,
        value: ParamValue,
    },

    // ── Nodes ──────────────────────────────────────
    NodeRegistered {
        node_id: NodeId,
        api_url: String,
    },
    NodeRemoved {
        node_id: NodeId,
    },
    RolloutCompleted {
        action: RolloutAction,
        outcomes: BTreeMap<NodeId, NodeOutcome>,
    },
    NodeHealthUpdated {
        node_id: NodeId,
        status: NodeStatus,
    },

    // ── Connections ────────────────────────────────
    ConnectionUpdated {
        source: DataSourceType,
        field: ConnectionField,
    },
    FieldMapped {
        source: DataSourceType,
        source_field: String,
        engine_field: String,
        data_type: FieldDataType,
    },
}

impl ConsoleEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConsoleEvent::CaseGenerated { .. }        => "case_generated",
            ConsoleEvent::CaseStatusChanged { .. }    => "case_status_changed",
            ConsoleEvent::RuleToggled { .. }          => "rule_toggled",
            ConsoleEvent::RuleParameterChanged { .. } => "rule_parameter_changed",
            ConsoleEvent::NodeRegistered { .. }       => "node_registered",
            ConsoleEvent::NodeRemoved { .. }          => "node_removed",
            ConsoleEvent::RolloutCompleted { .. }     => "rollout_completed",
            ConsoleEvent::NodeHealthUpdated { .. }    => "node_health_updated",
            ConsoleEvent::ConnectionUpdated { .. }    => "connection_updated",
            ConsoleEvent::FieldMapped { .. }          => "field_mapped",
        }
    }

    /// Component that produced the event.
    pub fn source(&self) -> &'static str {
        match self {
            ConsoleEvent::CaseGenerated { .. } | ConsoleEvent::CaseStatusChanged { .. } => "cases",
            ConsoleEvent::RuleToggled { .. } | ConsoleEvent::RuleParameterChanged { .. } => "rules",
            ConsoleEvent::NodeRegistered { .. }
            | ConsoleEvent::NodeRemoved { .. }
            | ConsoleEvent::RolloutCompleted { .. }
            | ConsoleEvent::NodeHealthUpdated { .. } => "nodes",
            ConsoleEvent::ConnectionUpdated { .. } | ConsoleEvent::FieldMapped { .. } => "connections",
        }
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub source: String,
    pub event_type: String,
    pub payload: String,
    pub created_at: String,
}

impl EventLogEntry {
    pub fn from_event(event: &ConsoleEvent, created_at: String) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            source: event.source().to_string(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            created_at,
        })
    }
}
