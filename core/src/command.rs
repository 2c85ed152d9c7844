use crate::{
    nodes::{NodeHealth, NodeStatus},
    rollout::{ConnectionField, DataSourceType, FieldDataType, RolloutAction},
    rules::ParamValue,
    types::{CaseId, CustomerId, NodeId, RuleId, TransactionId},
};
use serde::{Deserialize, Serialize};

/// All state-changing analyst and operator commands.
/// Variants are appended over time; never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ConsoleCommand {
    // ── Cases ─────────────────────────────────────
    GenerateStr {
        transaction_id: TransactionId,
        #[serde(default)]
        customer_id:    Option<CustomerId>,
        #[serde(default)]
        reason:         Option<String>,
        #[serde(default)]
        flags:          Vec<String>,
    },
    FileStr {
        case_id: CaseId,
    },
    DismissStr {
        case_id: CaseId,
    },
    NarrateStr {
        case_id: CaseId,
    },
    SweepAutoTriggers,

    // ── Rules ─────────────────────────────────────
    ToggleRule {
        rule_id: RuleId,
    },
    SetRuleParam {
        rule_id: RuleId,
        key:     String,
        value:   ParamValue,
    },

    // ── Nodes ─────────────────────────────────────
    RegisterNode {
        name:     String,
        #[serde(default)]
        location: String,
        api_url:  String,
    },
    RemoveNode {
        node_id: NodeId,
    },
    UpdateNodeHealth {
        node_id: NodeId,
        status:  NodeStatus,
        health:  NodeHealth,
    },

    // ── Connections & rollout ─────────────────────
    UpdateConnection {
        source: DataSourceType,
        field:  ConnectionField,
        value:  String,
    },
    MapField {
        source:       DataSourceType,
        source_field: String,
        engine_field: String,
        data_type:    FieldDataType,
    },
    Rollout {
        source:   DataSourceType,
        action:   RolloutAction,
        /// `None` targets the default selection.
        #[serde(default)]
        node_ids: Option<Vec<NodeId>>,
    },
}
