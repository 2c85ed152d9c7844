//! Data-source configuration and its rollout to engine nodes.
//!
//! RULES:
//!   - Selected nodes are called concurrently. Outcomes resolve
//!     independently and in no particular order.
//!   - No retries. A failed node stays failed for this rollout.
//!   - An empty selection makes no calls and changes no state.
//!   - Only `TestAndDeploy` touches the connection status: connected if at
//!     least one node succeeded, error otherwise.

use crate::{
    error::{ConsoleError, ConsoleResult},
    nodes::{EngineNode, NodeRegistry},
    rng::StreamRng,
    rules::AnalysisSettings,
    types::NodeId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap, ops::Range, time::Duration};
use tokio::sync::mpsc;

// ── Connection config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceType {
    Database,
    Kafka,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDataType {
    String,
    Number,
    Date,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub engine_field: String,
    pub data_type:    FieldDataType,
    #[serde(default)]
    pub is_required:  bool,
}

/// Engine fields every mapping set must cover.
pub const REQUIRED_ENGINE_FIELDS: [(&str, FieldDataType); 5] = [
    ("transaction_id", FieldDataType::String),
    ("account_number", FieldDataType::String),
    ("amount", FieldDataType::Number),
    ("timestamp", FieldDataType::Date),
    ("branch_id", FieldDataType::String),
];

/// Editable connection fields. Any edit resets the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionField {
    Host,
    Port,
    Username,
    Password,
    DatabaseName,
    TopicName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub source_type:   DataSourceType,
    pub host:          String,
    pub port:          String,
    #[serde(default)]
    pub username:      Option<String>,
    #[serde(default)]
    pub password:      Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub topic_name:    Option<String>,
    pub status:        ConnectionStatus,
    #[serde(default)]
    pub last_test:     Option<DateTime<Utc>>,
    #[serde(default)]
    pub mappings:      Vec<FieldMapping>,
}

impl ConnectionConfig {
    pub fn database(host: &str, port: &str, database_name: &str) -> Self {
        Self {
            source_type:   DataSourceType::Database,
            host:          host.into(),
            port:          port.into(),
            username:      None,
            password:      None,
            database_name: Some(database_name.into()),
            topic_name:    None,
            status:        ConnectionStatus::Disconnected,
            last_test:     None,
            mappings:      Vec::new(),
        }
    }

    pub fn kafka(host: &str, port: &str, topic_name: &str) -> Self {
        Self {
            source_type:   DataSourceType::Kafka,
            host:          host.into(),
            port:          port.into(),
            username:      None,
            password:      None,
            database_name: None,
            topic_name:    Some(topic_name.into()),
            status:        ConnectionStatus::Disconnected,
            last_test:     None,
            mappings:      Vec::new(),
        }
    }

    pub fn set_field(&mut self, field: ConnectionField, value: &str) {
        let optional = || (!value.is_empty()).then(|| value.to_string());
        match field {
            ConnectionField::Host         => self.host = value.to_string(),
            ConnectionField::Port         => self.port = value.to_string(),
            ConnectionField::Username     => self.username = optional(),
            ConnectionField::Password     => self.password = optional(),
            ConnectionField::DatabaseName => self.database_name = optional(),
            ConnectionField::TopicName    => self.topic_name = optional(),
        }
        self.status = ConnectionStatus::Disconnected;
    }

    /// Map `engine_field` to `source_field`, replacing any existing mapping
    /// for that engine field.
    pub fn map_field(&mut self, source_field: &str, engine_field: &str, data_type: FieldDataType) {
        let is_required = REQUIRED_ENGINE_FIELDS.iter().any(|(name, _)| *name == engine_field);
        self.mappings.retain(|m| m.engine_field != engine_field);
        self.mappings.push(FieldMapping {
            source_field: source_field.to_string(),
            engine_field: engine_field.to_string(),
            data_type,
            is_required,
        });
    }

    pub fn unmap_field(&mut self, engine_field: &str) {
        self.mappings.retain(|m| m.engine_field != engine_field);
    }

    /// Required engine fields with no mapping.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        REQUIRED_ENGINE_FIELDS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !self.mappings.iter().any(|m| m.engine_field == *name))
            .collect()
    }

    pub fn mapping_complete(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// Record a finished rollout. Only `TestAndDeploy` changes status, and
    /// an empty report changes nothing.
    pub fn record_rollout(&mut self, report: &RolloutReport, now: DateTime<Utc>) {
        if report.action != RolloutAction::TestAndDeploy || report.is_empty() {
            return;
        }
        if report.any_success() {
            self.status = ConnectionStatus::Connected;
            self.last_test = Some(now);
        } else {
            self.status = ConnectionStatus::Error;
        }
    }
}

// ── Payload ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreDatabaseSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username:      Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password:      Option<String>,
    pub host:          String,
    pub port:          String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeDataSourceSettings {
    pub bootstrap_server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic:            Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfigurations {
    #[serde(rename = "Central_Core_Database_Settings", skip_serializing_if = "Option::is_none", default)]
    pub core_database: Option<CoreDatabaseSettings>,
    #[serde(rename = "Realtime_Data_Source_Settings", skip_serializing_if = "Option::is_none", default)]
    pub realtime_source: Option<RealtimeDataSourceSettings>,
}

/// Configuration update in the shape the engine's settings endpoint takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPayload {
    #[serde(rename = "Connection_Configurations")]
    pub connection: ConnectionConfigurations,
    /// Engine field → source field.
    #[serde(rename = "Central_Core_Database_Data_Schema_Mapping")]
    pub schema_mapping: BTreeMap<String, String>,
    #[serde(rename = "Data_Analysis_Configurations", skip_serializing_if = "Option::is_none", default)]
    pub analysis: Option<AnalysisSettings>,
}

impl RolloutPayload {
    pub fn from_connection(config: &ConnectionConfig) -> Self {
        let connection = match config.source_type {
            DataSourceType::Database => ConnectionConfigurations {
                core_database: Some(CoreDatabaseSettings {
                    username:      config.username.clone(),
                    password:      config.password.clone(),
                    host:          config.host.clone(),
                    port:          config.port.clone(),
                    database_name: config.database_name.clone(),
                }),
                realtime_source: None,
            },
            DataSourceType::Kafka => ConnectionConfigurations {
                core_database:   None,
                realtime_source: Some(RealtimeDataSourceSettings {
                    bootstrap_server: format!("{}:{}", config.host, config.port),
                    topic:            config.topic_name.clone(),
                }),
            },
        };
        let schema_mapping = config
            .mappings
            .iter()
            .map(|m| (m.engine_field.clone(), m.source_field.clone()))
            .collect();
        Self {
            connection,
            schema_mapping,
            analysis: None,
        }
    }

    pub fn with_analysis(mut self, settings: AnalysisSettings) -> Self {
        self.analysis = Some(settings);
        self
    }
}

// ── Outcomes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutAction {
    /// Verify connectivity through the nodes and deploy the connection.
    TestAndDeploy,
    /// Push the field mapping only.
    UploadMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOutcome {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloutProgress {
    pub node_id: NodeId,
    pub outcome: NodeOutcome,
    pub detail:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloutReport {
    pub action:   RolloutAction,
    pub outcomes: BTreeMap<NodeId, NodeOutcome>,
    pub errors:   BTreeMap<NodeId, String>,
}

impl RolloutReport {
    pub fn empty(action: RolloutAction) -> Self {
        Self {
            action,
            outcomes: BTreeMap::new(),
            errors:   BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| **o == NodeOutcome::Success).count()
    }

    pub fn any_success(&self) -> bool {
        self.success_count() > 0
    }
}

// ── Node clients ─────────────────────────────────────────────────────────────

#[async_trait(?Send)]
pub trait NodeClient {
    /// Deliver `payload` to one node.
    async fn push_config(&self, node: &EngineNode, payload: &RolloutPayload) -> ConsoleResult<()>;

    /// The configuration a node is currently running.
    async fn dump_config(&self, node: &EngineNode) -> ConsoleResult<serde_json::Value>;
}

const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to `{api_url}/configurations` on each node.
pub struct HttpNodeClient {
    client: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new() -> ConsoleResult<Self> {
        Self::with_timeout(DEFAULT_NODE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> ConsoleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsoleError::Other(e.into()))?;
        Ok(Self { client })
    }

    fn endpoint(node: &EngineNode) -> String {
        format!("{}/configurations", node.api_url.trim_end_matches('/'))
    }
}

fn remote(node: &EngineNode, reason: impl ToString) -> ConsoleError {
    ConsoleError::Remote {
        node_id: node.id.clone(),
        reason:  reason.to_string(),
    }
}

#[async_trait(?Send)]
impl NodeClient for HttpNodeClient {
    async fn push_config(&self, node: &EngineNode, payload: &RolloutPayload) -> ConsoleResult<()> {
        let response = self
            .client
            .post(Self::endpoint(node))
            .json(payload)
            .send()
            .await
            .map_err(|e| remote(node, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(remote(node, format!("POST returned {status}")));
        }
        Ok(())
    }

    async fn dump_config(&self, node: &EngineNode) -> ConsoleResult<serde_json::Value> {
        let response = self
            .client
            .get(Self::endpoint(node))
            .send()
            .await
            .map_err(|e| remote(node, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(remote(node, format!("GET returned {status}")));
        }
        response.json().await.map_err(|e| remote(node, e))
    }
}

/// Offline stand-in for real nodes: seeded latency and failure rate.
/// Remembers the last payload each node accepted so dumps reflect it.
pub struct SimulatedNodeClient {
    rng:          RefCell<StreamRng>,
    latency_ms:   Range<f64>,
    failure_rate: f64,
    deployed:     RefCell<BTreeMap<NodeId, RolloutPayload>>,
}

impl SimulatedNodeClient {
    pub fn new(seed: u64) -> Self {
        Self {
            rng:          RefCell::new(StreamRng::new(seed, 0)),
            latency_ms:   800.0..1800.0,
            failure_rate: 0.1,
            deployed:     RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_latency(mut self, latency_ms: Range<f64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }
}

#[async_trait(?Send)]
impl NodeClient for SimulatedNodeClient {
    async fn push_config(&self, node: &EngineNode, payload: &RolloutPayload) -> ConsoleResult<()> {
        // Draw before the first await so the stream order follows call order.
        let (delay, fails) = {
            let mut rng = self.rng.borrow_mut();
            let delay = rng.uniform(self.latency_ms.start, self.latency_ms.end);
            (delay, rng.chance(self.failure_rate))
        };
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;

        if fails {
            return Err(remote(node, "simulated connection failure"));
        }
        self.deployed.borrow_mut().insert(node.id.clone(), payload.clone());
        Ok(())
    }

    async fn dump_config(&self, node: &EngineNode) -> ConsoleResult<serde_json::Value> {
        match self.deployed.borrow().get(&node.id) {
            Some(payload) => Ok(serde_json::to_value(payload)?),
            None => Ok(serde_json::json!({})),
        }
    }
}

// ── Coordinator ──────────────────────────────────────────────────────────────

pub struct RolloutCoordinator<C> {
    client: C,
}

impl<C: NodeClient> RolloutCoordinator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Push `payload` to every selected node at once and collect outcomes.
    /// Progress, if requested, starts with `pending` for every node and then
    /// reports each node as it resolves.
    pub async fn rollout(
        &self,
        registry: &NodeRegistry,
        node_ids: &[NodeId],
        payload: &RolloutPayload,
        action: RolloutAction,
        progress: Option<&mpsc::UnboundedSender<RolloutProgress>>,
    ) -> RolloutReport {
        let mut report = RolloutReport::empty(action);
        if node_ids.is_empty() {
            return report;
        }

        let emit = |node_id: &str, outcome: NodeOutcome, detail: Option<String>| {
            if let Some(tx) = progress {
                let _ = tx.send(RolloutProgress {
                    node_id: node_id.to_string(),
                    outcome,
                    detail,
                });
            }
        };

        let mut targets: Vec<&EngineNode> = Vec::new();
        for id in node_ids {
            if report.outcomes.contains_key(id) {
                continue;
            }
            report.outcomes.insert(id.clone(), NodeOutcome::Pending);
            emit(id, NodeOutcome::Pending, None);
            match registry.get(id) {
                Some(node) => targets.push(node),
                None => {
                    let reason = format!("node {id} is not registered");
                    log::warn!("Rollout {action:?}: {reason}");
                    report.outcomes.insert(id.clone(), NodeOutcome::Error);
                    report.errors.insert(id.clone(), reason.clone());
                    emit(id, NodeOutcome::Error, Some(reason));
                }
            }
        }

        let client = &self.client;
        let mut calls: FuturesUnordered<_> = targets
            .into_iter()
            .map(|node| async move { (node, client.push_config(node, payload).await) })
            .collect();

        while let Some((node, result)) = calls.next().await {
            match result {
                Ok(()) => {
                    log::info!("Rollout {action:?}: node {} succeeded", node.id);
                    report.outcomes.insert(node.id.clone(), NodeOutcome::Success);
                    emit(&node.id, NodeOutcome::Success, None);
                }
                Err(e) => {
                    log::warn!("Rollout {action:?}: node {} failed: {e}", node.id);
                    report.outcomes.insert(node.id.clone(), NodeOutcome::Error);
                    report.errors.insert(node.id.clone(), e.to_string());
                    emit(&node.id, NodeOutcome::Error, Some(e.to_string()));
                }
            }
        }

        log::info!(
            "Rollout {action:?} finished: {}/{} nodes succeeded",
            report.success_count(),
            report.outcomes.len()
        );
        report
    }

    pub async fn dump_node_config(&self, registry: &NodeRegistry, node_id: &str) -> ConsoleResult<serde_json::Value> {
        let node = registry
            .get(node_id)
            .ok_or_else(|| ConsoleError::NodeNotFound { node_id: node_id.to_string() })?;
        self.client.dump_config(node).await
    }
}
