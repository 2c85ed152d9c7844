//! Analysis-engine node registry.
//!
//! Nodes are registered and removed by an operator. Health is pushed in
//! by an external monitor through `update_health`.

use crate::{
    error::{ConsoleError, ConsoleResult},
    types::NodeId,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCATION: &str = "Unknown Location";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub cpu_usage:  f64,
    pub ram_usage:  f64,
    pub uptime:     String,
    /// Transactions per second.
    pub throughput: f64,
    /// Milliseconds.
    pub latency:    f64,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self {
            cpu_usage:  0.0,
            ram_usage:  0.0,
            uptime:     "0d 00h".into(),
            throughput: 0.0,
            latency:    0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineNode {
    pub id:       NodeId,
    pub name:     String,
    pub location: String,
    pub api_url:  String,
    pub status:   NodeStatus,
    #[serde(default)]
    pub health:   NodeHealth,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NodesFile {
    pub nodes: Vec<EngineNode>,
}

/// Aggregates shown above the node table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FleetMetrics {
    pub total_nodes:      usize,
    pub online_nodes:     usize,
    pub total_throughput: f64,
    /// Mean latency over nodes that are not offline. 0 when none are.
    pub average_latency:  f64,
}

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<EngineNode>,
}

impl NodeRegistry {
    pub fn new(nodes: Vec<EngineNode>) -> Self {
        Self { nodes }
    }

    /// Register a node. Name and URL are required; a blank location
    /// becomes `DEFAULT_LOCATION`. New nodes start online with empty health.
    pub fn register(&mut self, name: &str, location: &str, api_url: &str) -> ConsoleResult<EngineNode> {
        let name = name.trim();
        let api_url = api_url.trim();
        if name.is_empty() {
            return Err(ConsoleError::InvalidNode { reason: "node name is required".into() });
        }
        if api_url.is_empty() {
            return Err(ConsoleError::InvalidNode { reason: "API URL is required".into() });
        }
        let parsed = url::Url::parse(api_url).map_err(|e| ConsoleError::InvalidNode {
            reason: format!("invalid API URL '{api_url}': {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConsoleError::InvalidNode {
                reason: format!("API URL '{api_url}' must use http or https"),
            });
        }

        let location = location.trim();
        let node = EngineNode {
            id:       format!("node-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            name:     name.to_string(),
            location: if location.is_empty() { DEFAULT_LOCATION.to_string() } else { location.to_string() },
            api_url:  api_url.trim_end_matches('/').to_string(),
            status:   NodeStatus::Online,
            health:   NodeHealth::default(),
        };
        log::info!("Registered engine node {} at {}", node.id, node.api_url);
        self.nodes.push(node.clone());
        Ok(node)
    }

    pub fn remove(&mut self, node_id: &str) -> ConsoleResult<EngineNode> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.id == node_id)
            .ok_or_else(|| ConsoleError::NodeNotFound { node_id: node_id.to_string() })?;
        let node = self.nodes.remove(idx);
        log::info!("Removed engine node {node_id}");
        Ok(node)
    }

    pub fn get(&self, node_id: &str) -> Option<&EngineNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn list(&self) -> &[EngineNode] {
        &self.nodes
    }

    /// Pre-selected rollout targets: every node that is not offline.
    pub fn default_selection(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.status != NodeStatus::Offline)
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn update_health(&mut self, node_id: &str, status: NodeStatus, health: NodeHealth) -> ConsoleResult<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| ConsoleError::NodeNotFound { node_id: node_id.to_string() })?;
        if node.status != status {
            log::info!("Node {node_id} status {:?} -> {status:?}", node.status);
        }
        node.status = status;
        node.health = health;
        Ok(())
    }

    pub fn metrics(&self) -> FleetMetrics {
        let live: Vec<&EngineNode> = self
            .nodes
            .iter()
            .filter(|n| n.status != NodeStatus::Offline)
            .collect();
        let average_latency = if live.is_empty() {
            0.0
        } else {
            live.iter().map(|n| n.health.latency).sum::<f64>() / live.len() as f64
        };
        FleetMetrics {
            total_nodes:      self.nodes.len(),
            online_nodes:     self.nodes.iter().filter(|n| n.status == NodeStatus::Online).count(),
            total_throughput: self.nodes.iter().map(|n| n.health.throughput).sum(),
            average_latency,
        }
    }
}
