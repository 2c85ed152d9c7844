use crate::{
    nodes::{EngineNode, NodeHealth, NodeStatus, NodesFile},
    pagination::{DEFAULT_DEBOUNCE, DEFAULT_ITEMS_PER_PAGE},
    rollout::ConnectionConfig,
    rules::{default_rules, AnalysisRule, RulesFile},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Console behaviour knobs from `console.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u64,
    #[serde(default = "default_debounce_ms")]
    pub search_debounce_ms: u64,
    /// Raise STRs automatically for HIGH profiles, not just CRITICAL.
    #[serde(default)]
    pub high_band_auto_trigger: bool,
    #[serde(default = "default_node_timeout_ms")]
    pub node_request_timeout_ms: u64,
    /// Remote profile store. `None` reads the local database.
    #[serde(default)]
    pub profile_source_url: Option<String>,
}

fn default_items_per_page() -> u64 {
    DEFAULT_ITEMS_PER_PAGE
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_node_timeout_ms() -> u64 {
    10_000
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            items_per_page:          default_items_per_page(),
            search_debounce_ms:      default_debounce_ms(),
            high_band_auto_trigger:  false,
            node_request_timeout_ms: default_node_timeout_ms(),
            profile_source_url:      None,
        }
    }
}

impl ConsoleSettings {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn node_request_timeout(&self) -> Duration {
        Duration::from_millis(self.node_request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsFile {
    pub database: ConnectionConfig,
    pub kafka:    ConnectionConfig,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub settings:    ConsoleSettings,
    pub rules:       Vec<AnalysisRule>,
    pub nodes:       Vec<EngineNode>,
    pub connections: ConnectionsFile,
}

impl ConsoleConfig {
    /// Load from the data/ directory.
    /// In tests, use ConsoleConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let settings_path = format!("{data_dir}/console.json");
        let settings_content = std::fs::read_to_string(&settings_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {settings_path}: {e}"))?;
        let settings: ConsoleSettings = serde_json::from_str(&settings_content)?;

        let rules_path = format!("{data_dir}/rules/analysis_rules.json");
        let rules_content = std::fs::read_to_string(&rules_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {rules_path}: {e}"))?;
        let rules_file: RulesFile = serde_json::from_str(&rules_content)?;

        let nodes_path = format!("{data_dir}/nodes/engine_nodes.json");
        let nodes_content = std::fs::read_to_string(&nodes_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {nodes_path}: {e}"))?;
        let nodes_file: NodesFile = serde_json::from_str(&nodes_content)?;

        let connections_path = format!("{data_dir}/connections/connections.json");
        let connections_content = std::fs::read_to_string(&connections_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {connections_path}: {e}"))?;
        let connections: ConnectionsFile = serde_json::from_str(&connections_content)?;

        log::info!(
            "Loaded config from {data_dir}: {} rules, {} nodes",
            rules_file.rules.len(),
            nodes_file.nodes.len()
        );

        Ok(Self {
            settings,
            rules: rules_file.rules,
            nodes: nodes_file.nodes,
            connections,
        })
    }

    /// Hard-coded config for tests. Mirrors the shipped data/ files.
    pub fn default_test() -> Self {
        Self {
            settings:    ConsoleSettings::default(),
            rules:       default_rules(),
            nodes:       default_nodes(),
            connections: ConnectionsFile {
                database: ConnectionConfig::database("db-01.internal", "5432", "core_banking"),
                kafka:    ConnectionConfig::kafka("kafka-broker", "9092", "live-transactions"),
            },
        }
    }
}

fn seed_node(id: &str, name: &str, api_url: &str, status: NodeStatus, health: NodeHealth) -> EngineNode {
    EngineNode {
        id:       id.into(),
        name:     name.into(),
        location: "Ethiopia".into(),
        api_url:  api_url.into(),
        status,
        health,
    }
}

pub fn default_nodes() -> Vec<EngineNode> {
    vec![
        seed_node(
            "node-01",
            "Engine One (Addis Ababa)",
            "https://engine.one.internal:8080",
            NodeStatus::Online,
            NodeHealth { cpu_usage: 45.0, ram_usage: 62.0, uptime: "14d 02h".into(), throughput: 850.0, latency: 42.0 },
        ),
        seed_node(
            "node-02",
            "Engine Two (Bahir Dar)",
            "https://engine.two.internal:8080",
            NodeStatus::Online,
            NodeHealth { cpu_usage: 32.0, ram_usage: 55.0, uptime: "3d 12h".into(), throughput: 620.0, latency: 38.0 },
        ),
        seed_node(
            "node-03",
            "Engine Three (Bishoftu)",
            "https://engine.three.internal:8080",
            NodeStatus::Degraded,
            NodeHealth { cpu_usage: 88.0, ram_usage: 91.0, uptime: "21d 05h".into(), throughput: 410.0, latency: 156.0 },
        ),
    ]
}
