//! Console application state.
//!
//! RULE: The rule registry, case list, node registry and connection
//! configs are owned here and changed only through `Console` methods.
//! Every change appends one `ConsoleEvent` to the store's event log. A new
//! case is stored only after its event is logged.

use crate::{
    cases::{CaseFilter, CaseManager, ManualTrigger, StatusCounts, Str, StrStatus, MANUAL_TRIGGER_REASON},
    command::ConsoleCommand,
    config::{ConsoleConfig, ConsoleSettings},
    error::{ConsoleError, ConsoleResult},
    event::ConsoleEvent,
    narrative::{NarrativeService, UnconfiguredNarrative},
    nodes::{EngineNode, FleetMetrics, NodeHealth, NodeRegistry, NodeStatus},
    profile::{CustomerRiskProfile, TransactionRiskProfile},
    query::QueryCriteria,
    risk_band::RiskBand,
    rollout::{
        ConnectionConfig, ConnectionField, ConnectionStatus, DataSourceType, FieldDataType, NodeClient, RolloutAction,
        RolloutCoordinator, RolloutPayload, RolloutProgress, RolloutReport,
    },
    rules::{AnalysisCategory, AnalysisRule, ParamValue, RuleRegistry},
    store::ProfileStore,
    types::{NodeId, ProfileKind},
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;

/// Counters for the console header.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleSummary {
    pub rules_total:        usize,
    pub rules_enabled:      usize,
    pub cases:              StatusCounts,
    pub fleet:              FleetMetrics,
    pub database_status:    ConnectionStatus,
    pub kafka_status:       ConnectionStatus,
    pub transaction_count:  u64,
    pub customer_count:     u64,
}

pub struct Console<C> {
    store:    ProfileStore,
    settings: ConsoleSettings,
    rules:    RuleRegistry,
    cases:    CaseManager,
    nodes:    NodeRegistry,
    database: ConnectionConfig,
    kafka:    ConnectionConfig,
    rollout:  RolloutCoordinator<C>,
    narrator: Box<dyn NarrativeService>,
}

impl<C: NodeClient> Console<C> {
    pub fn new(store: ProfileStore, config: ConsoleConfig, client: C) -> ConsoleResult<Self> {
        Ok(Self {
            store,
            rules:    RuleRegistry::new(config.rules)?,
            cases:    CaseManager::new(config.settings.high_band_auto_trigger),
            nodes:    NodeRegistry::new(config.nodes),
            database: config.connections.database,
            kafka:    config.connections.kafka,
            settings: config.settings,
            rollout:  RolloutCoordinator::new(client),
            narrator: Box::new(UnconfiguredNarrative),
        })
    }

    pub fn with_narrator(mut self, narrator: Box<dyn NarrativeService>) -> Self {
        self.narrator = narrator;
        self
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn cases(&self) -> &CaseManager {
        &self.cases
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn rollout_client(&self) -> &C {
        self.rollout.client()
    }

    pub fn connection(&self, source: DataSourceType) -> &ConnectionConfig {
        match source {
            DataSourceType::Database => &self.database,
            DataSourceType::Kafka    => &self.kafka,
        }
    }

    fn connection_mut(&mut self, source: DataSourceType) -> &mut ConnectionConfig {
        match source {
            DataSourceType::Database => &mut self.database,
            DataSourceType::Kafka    => &mut self.kafka,
        }
    }

    fn emit(&self, event: ConsoleEvent) -> ConsoleResult<()> {
        log::debug!("event: {}", event.type_name());
        self.store.append_event(&event)
    }

    pub fn summary(&self) -> ConsoleResult<ConsoleSummary> {
        let all = QueryCriteria::default();
        Ok(ConsoleSummary {
            rules_total:       self.rules.len(),
            rules_enabled:     self.rules.enabled_count(),
            cases:             self.cases.status_counts(),
            fleet:             self.nodes.metrics(),
            database_status:   self.database.status,
            kafka_status:      self.kafka.status,
            transaction_count: self.store.count_profiles(ProfileKind::Transaction, &all)?,
            customer_count:    self.store.count_profiles(ProfileKind::Customer, &all)?,
        })
    }

    // ── Profiles ──────────────────────────────────────────────

    pub fn transactions(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<TransactionRiskProfile>> {
        self.store.query_profiles(criteria)
    }

    pub fn customers(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<CustomerRiskProfile>> {
        self.store.query_profiles(criteria)
    }

    // ── Cases ─────────────────────────────────────────────────

    /// Analyst-triggered STR. Uses the stored transaction profile when one
    /// exists, merging the analyst's flags into its reason codes; otherwise
    /// `customer_id` must be supplied. A supplied `customer_id` always wins.
    pub fn generate_str(
        &mut self,
        transaction_id: &str,
        customer_id: Option<&str>,
        reason: Option<&str>,
        flags: &[String],
    ) -> ConsoleResult<Str> {
        let case = match self.store.transaction_profile(transaction_id)? {
            Some(profile) => {
                let manual = ManualTrigger { customer_id, reason, flags };
                self.cases.prepare_for_profile(&profile, &manual)?
            }
            None => {
                let customer_id = customer_id.ok_or_else(|| ConsoleError::ProfileNotFound {
                    key: transaction_id.to_string(),
                })?;
                let reason = reason.unwrap_or(MANUAL_TRIGGER_REASON);
                self.cases.prepare(transaction_id, customer_id, reason, flags)?
            }
        };
        self.commit_case(case, false)
    }

    pub fn auto_trigger(&mut self, profile: &TransactionRiskProfile) -> ConsoleResult<Option<Str>> {
        match self.cases.prepare_auto_trigger(profile)? {
            Some(case) => self.commit_case(case, true).map(Some),
            None => Ok(None),
        }
    }

    fn commit_case(&mut self, case: Str, automatic: bool) -> ConsoleResult<Str> {
        self.emit(ConsoleEvent::CaseGenerated {
            case_id:        case.id.clone(),
            transaction_id: case.transaction_id.clone(),
            customer_id:    case.customer_id.clone(),
            automatic,
        })?;
        self.cases.commit(case.clone());
        Ok(case)
    }

    /// Auto-trigger every stored profile in a triggering band.
    pub fn sweep_auto_triggers(&mut self) -> ConsoleResult<Vec<Str>> {
        let mut bands = vec![RiskBand::Critical];
        if self.settings.high_band_auto_trigger {
            bands.push(RiskBand::High);
        }
        let mut raised = Vec::new();
        for band in bands {
            let profiles: Vec<TransactionRiskProfile> = self.store.query_profiles(&QueryCriteria::band(band))?;
            for profile in &profiles {
                if let Some(case) = self.auto_trigger(profile)? {
                    raised.push(case);
                }
            }
        }
        log::info!("Auto-trigger sweep raised {} STRs", raised.len());
        Ok(raised)
    }

    pub fn file_str(&mut self, case_id: &str) -> ConsoleResult<()> {
        let from = self.cases.file(case_id)?;
        self.emit(ConsoleEvent::CaseStatusChanged {
            case_id: case_id.to_string(),
            from,
            to: StrStatus::Filed,
        })
    }

    pub fn dismiss_str(&mut self, case_id: &str) -> ConsoleResult<()> {
        let from = self.cases.dismiss(case_id)?;
        self.emit(ConsoleEvent::CaseStatusChanged {
            case_id: case_id.to_string(),
            from,
            to: StrStatus::Dismissed,
        })
    }

    pub fn list_strs(&self, filter: &CaseFilter) -> Vec<&Str> {
        self.cases.list(filter)
    }

    /// Attach an AI narrative to a case, with profiles from the store as
    /// context. Never fails because of the narrative service itself.
    pub async fn narrate_str(&mut self, case_id: &str) -> ConsoleResult<String> {
        let case = self.cases.get(case_id)?;
        let transaction = self.store.transaction_profile(&case.transaction_id)?;
        let customer = self.store.customer_profile(&case.customer_id)?;
        self.cases
            .attach_narrative(case_id, self.narrator.as_ref(), transaction.as_ref(), customer.as_ref())
            .await
    }

    // ── Rules ─────────────────────────────────────────────────

    pub fn list_rules(&self, category: Option<AnalysisCategory>) -> Vec<&AnalysisRule> {
        self.rules.list(category)
    }

    pub fn toggle_rule(&mut self, rule_id: &str) -> ConsoleResult<bool> {
        let enabled = self.rules.toggle(rule_id)?;
        self.emit(ConsoleEvent::RuleToggled {
            rule_id: rule_id.to_string(),
            enabled,
        })?;
        Ok(enabled)
    }

    pub fn set_rule_param(&mut self, rule_id: &str, key: &str, value: ParamValue) -> ConsoleResult<()> {
        let previous = self.rules.set_parameter(rule_id, key, value.clone())?;
        self.emit(ConsoleEvent::RuleParameterChanged {
            rule_id: rule_id.to_string(),
            key:     key.to_string(),
            previous,
            value,
        })
    }

    // ── Nodes ─────────────────────────────────────────────────

    pub fn register_node(&mut self, name: &str, location: &str, api_url: &str) -> ConsoleResult<EngineNode> {
        let node = self.nodes.register(name, location, api_url)?;
        self.emit(ConsoleEvent::NodeRegistered {
            node_id: node.id.clone(),
            api_url: node.api_url.clone(),
        })?;
        Ok(node)
    }

    pub fn remove_node(&mut self, node_id: &str) -> ConsoleResult<()> {
        self.nodes.remove(node_id)?;
        self.emit(ConsoleEvent::NodeRemoved { node_id: node_id.to_string() })
    }

    pub fn update_node_health(&mut self, node_id: &str, status: NodeStatus, health: NodeHealth) -> ConsoleResult<()> {
        self.nodes.update_health(node_id, status, health)?;
        self.emit(ConsoleEvent::NodeHealthUpdated {
            node_id: node_id.to_string(),
            status,
        })
    }

    // ── Connections & rollout ─────────────────────────────────

    /// The logged event names the field but never its value.
    pub fn update_connection(&mut self, source: DataSourceType, field: ConnectionField, value: &str) -> ConsoleResult<()> {
        self.connection_mut(source).set_field(field, value);
        self.emit(ConsoleEvent::ConnectionUpdated { source, field })
    }

    pub fn map_field(
        &mut self,
        source: DataSourceType,
        source_field: &str,
        engine_field: &str,
        data_type: FieldDataType,
    ) -> ConsoleResult<()> {
        self.connection_mut(source).map_field(source_field, engine_field, data_type);
        self.emit(ConsoleEvent::FieldMapped {
            source,
            source_field: source_field.to_string(),
            engine_field: engine_field.to_string(),
            data_type,
        })
    }

    /// Push one connection's config to `node_ids`, or to the default
    /// selection when `None`. The payload carries the current analysis
    /// switches alongside the connection and mapping.
    pub async fn rollout(
        &mut self,
        source: DataSourceType,
        action: RolloutAction,
        node_ids: Option<Vec<NodeId>>,
        progress: Option<&mpsc::UnboundedSender<RolloutProgress>>,
    ) -> ConsoleResult<RolloutReport> {
        let node_ids = node_ids.unwrap_or_else(|| self.nodes.default_selection());
        let payload = RolloutPayload::from_connection(self.connection(source))
            .with_analysis(self.rules.analysis_settings());

        let report = self
            .rollout
            .rollout(&self.nodes, &node_ids, &payload, action, progress)
            .await;
        if report.is_empty() {
            return Ok(report);
        }

        self.connection_mut(source).record_rollout(&report, chrono::Utc::now());
        self.emit(ConsoleEvent::RolloutCompleted {
            action,
            outcomes: report.outcomes.clone(),
        })?;
        Ok(report)
    }

    pub async fn dump_node_config(&self, node_id: &str) -> ConsoleResult<serde_json::Value> {
        self.rollout.dump_node_config(&self.nodes, node_id).await
    }

    // ── Command dispatch ──────────────────────────────────────

    /// Apply one command and return its result as JSON.
    pub async fn execute(&mut self, command: ConsoleCommand) -> ConsoleResult<serde_json::Value> {
        let value = match command {
            ConsoleCommand::GenerateStr { transaction_id, customer_id, reason, flags } => {
                let case = self.generate_str(&transaction_id, customer_id.as_deref(), reason.as_deref(), &flags)?;
                serde_json::to_value(case)?
            }
            ConsoleCommand::FileStr { case_id } => {
                self.file_str(&case_id)?;
                serde_json::to_value(self.cases.get(&case_id)?)?
            }
            ConsoleCommand::DismissStr { case_id } => {
                self.dismiss_str(&case_id)?;
                serde_json::to_value(self.cases.get(&case_id)?)?
            }
            ConsoleCommand::NarrateStr { case_id } => {
                json!({ "case_id": case_id, "narrative": self.narrate_str(&case_id).await? })
            }
            ConsoleCommand::SweepAutoTriggers => serde_json::to_value(self.sweep_auto_triggers()?)?,
            ConsoleCommand::ToggleRule { rule_id } => {
                json!({ "rule_id": rule_id, "enabled": self.toggle_rule(&rule_id)? })
            }
            ConsoleCommand::SetRuleParam { rule_id, key, value } => {
                self.set_rule_param(&rule_id, &key, value)?;
                serde_json::to_value(self.rules.get(&rule_id)?)?
            }
            ConsoleCommand::RegisterNode { name, location, api_url } => {
                serde_json::to_value(self.register_node(&name, &location, &api_url)?)?
            }
            ConsoleCommand::RemoveNode { node_id } => {
                self.remove_node(&node_id)?;
                json!({ "removed": node_id })
            }
            ConsoleCommand::UpdateNodeHealth { node_id, status, health } => {
                self.update_node_health(&node_id, status, health)?;
                serde_json::to_value(self.nodes.get(&node_id))?
            }
            ConsoleCommand::UpdateConnection { source, field, value } => {
                self.update_connection(source, field, &value)?;
                serde_json::to_value(self.connection(source))?
            }
            ConsoleCommand::MapField { source, source_field, engine_field, data_type } => {
                self.map_field(source, &source_field, &engine_field, data_type)?;
                serde_json::to_value(self.connection(source))?
            }
            ConsoleCommand::Rollout { source, action, node_ids } => {
                serde_json::to_value(self.rollout(source, action, node_ids, None).await?)?
            }
        };
        Ok(value)
    }
}
