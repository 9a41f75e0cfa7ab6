//! Pure projection of an instance graph into a positioned visual payload.
//!
//! Nodes are laid out in columns by wiring depth (breadth-first from the
//! sources) and typed by role; nodes on a cycle, which have no depth, land
//! in a final column. Stateless; no caching concerns here.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::graph::InstanceGraph;

const X_SPACING: i64 = 260;
const Y_SPACING: i64 = 120;

#[derive(Debug, Clone, Serialize)]
pub struct FlowLayout {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: FlowNodeData,
    pub position: FlowPosition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowNodeData {
    pub label: String,
    pub role: String,
    pub type_symbol: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowPosition {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Project a graph into positioned nodes and typed edges.
pub fn flow_layout(graph: &InstanceGraph) -> FlowLayout {
    let depths = node_depths(graph);
    let max_depth = depths.values().copied().max().unwrap_or(0);

    // group ids by column, overflow column for nodes without a depth
    let mut columns: HashMap<usize, Vec<&str>> = HashMap::new();
    for node in graph.iter_nodes() {
        let depth = depths.get(node.id.as_str()).copied().unwrap_or(max_depth + 1);
        columns.entry(depth).or_default().push(node.id.as_str());
    }

    let mut nodes = Vec::with_capacity(graph.node_count());
    let mut column_keys: Vec<usize> = columns.keys().copied().collect();
    column_keys.sort_unstable();
    for depth in column_keys {
        let mut ids = columns.remove(&depth).unwrap_or_default();
        ids.sort_by_key(|id| graph.get_node(id).map(|n| n.name.clone()));
        for (row, id) in ids.iter().enumerate() {
            let Some(node) = graph.get_node(id) else { continue };
            nodes.push(FlowNode {
                id: node.id.clone(),
                kind: node.role.as_str().to_string(),
                data: FlowNodeData {
                    label: node.name.clone(),
                    role: node.role.as_str().to_string(),
                    type_symbol: node.type_symbol.clone(),
                },
                position: FlowPosition {
                    x: depth as i64 * X_SPACING,
                    y: row as i64 * Y_SPACING,
                },
            });
        }
    }

    let mut edges: Vec<FlowEdge> = graph
        .iter_edges()
        .map(|edge| FlowEdge {
            id: edge.id.clone(),
            source: edge.source_id.clone(),
            target: edge.target_id.clone(),
            label: edge.method.clone(),
        })
        .collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));

    FlowLayout { nodes, edges }
}

/// Breadth-first depth from the source nodes along wiring direction.
fn node_depths(graph: &InstanceGraph) -> HashMap<&str, usize> {
    let mut depths: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for source in graph.find_sources() {
        depths.insert(source.id.as_str(), 0);
        queue.push_back(source.id.as_str());
    }

    while let Some(id) = queue.pop_front() {
        let depth = depths[id];
        for edge in graph.get_outgoing_edges(id) {
            let target = edge.target_id.as_str();
            if !depths.contains_key(target) {
                depths.insert(target, depth + 1);
                queue.push_back(target);
            }
        }
    }
    depths
}
