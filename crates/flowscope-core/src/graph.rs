//! Node and flow dataset consumed by the engine.

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier of a node in the external dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier of a flow (edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Operational status of a node. Drives its fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
    Offline,
}

/// Value stored in a node or flow metadata map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Metadata key marking a node as anomalous.
pub const ANOMALY_KEY: &str = "anomaly";

/// A node of the network being visualized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec2,
    pub status: NodeStatus,
    /// Health in [0, 1]
    pub health: f32,
    /// Activity in [0, 1]
    pub activity: f32,
    pub connections: Vec<NodeId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Node {
    /// Create a healthy, idle node at the given position.
    pub fn new(id: NodeId, position: Vec2) -> Self {
        Self {
            id,
            position,
            status: NodeStatus::Healthy,
            health: 1.0,
            activity: 0.0,
            connections: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_health(mut self, health: f32) -> Self {
        self.health = health.clamp(0.0, 1.0);
        self
    }

    pub fn with_activity(mut self, activity: f32) -> Self {
        self.activity = activity.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the node carries `anomaly = true` in its metadata.
    pub fn is_anomalous(&self) -> bool {
        matches!(
            self.metadata.get(ANOMALY_KEY),
            Some(MetadataValue::Bool(true))
        )
    }
}

/// A directed flow of traffic between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub source: NodeId,
    pub target: NodeId,
    /// Traffic volume, drives stroke width and color intensity
    pub volume: f32,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Flow {
    pub fn new(id: FlowId, source: NodeId, target: NodeId, volume: f32) -> Self {
        Self {
            id,
            source,
            target,
            volume: volume.max(0.0),
            metadata: BTreeMap::new(),
        }
    }
}

/// One snapshot of the external dataset.
///
/// The engine holds a single snapshot at a time. Replacing it bumps the
/// generation, which is how the culler knows to rebuild its index.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    flows: Vec<Flow>,
    index_of: HashMap<NodeId, usize>,
    generation: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dataset. Flows referencing unknown nodes are dropped.
    pub fn replace(&mut self, nodes: Vec<Node>, flows: Vec<Flow>) {
        self.index_of = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id, idx))
            .collect();

        let before = flows.len();
        self.flows = flows
            .into_iter()
            .filter(|f| self.index_of.contains_key(&f.source) && self.index_of.contains_key(&f.target))
            .collect();
        if self.flows.len() < before {
            tracing::debug!(
                dropped = before - self.flows.len(),
                "Dropped flows with unknown endpoints"
            );
        }

        self.nodes = nodes;
        self.generation += 1;
        tracing::debug!(
            nodes = self.nodes.len(),
            flows = self.flows.len(),
            generation = self.generation,
            "Graph replaced"
        );
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    /// Index of a node by id.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    /// Monotonic counter bumped on every replacement.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Approximate heap footprint of the snapshot in bytes.
    pub fn heap_bytes(&self) -> usize {
        let nodes = self.nodes.capacity() * std::mem::size_of::<Node>()
            + self
                .nodes
                .iter()
                .map(|n| n.connections.capacity() * std::mem::size_of::<NodeId>())
                .sum::<usize>();
        let flows = self.flows.capacity() * std::mem::size_of::<Flow>();
        let map = self.index_of.capacity() * std::mem::size_of::<(NodeId, usize)>();
        nodes + flows + map
    }
}
