//! Instance graph container.
//!
//! Nodes and edges are indexed by id, with name and adjacency indices kept
//! consistent on every insertion. Serialization goes through [`GraphData`],
//! a plain record form; indices are rebuilt on load, never stored.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, WiremapError};
use crate::model::{InstanceNode, WiringEdge};

#[derive(Debug, Clone, Default)]
pub struct InstanceGraph {
    pub nodes: HashMap<String, InstanceNode>,
    pub edges: HashMap<String, WiringEdge>,
    pub name_to_id: HashMap<String, String>,
    pub outgoing: HashMap<String, Vec<String>>,
    pub incoming: HashMap<String, Vec<String>>,
    pub source_file: PathBuf,
    pub function_name: String,
    /// Wiring records discarded during build because an endpoint did not
    /// resolve to a declared instance.
    pub dropped_wiring: usize,
}

/// Plain record form of a graph, used for persistence and transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<InstanceNode>,
    pub edges: Vec<WiringEdge>,
    pub source_file: PathBuf,
    pub function_name: String,
    #[serde(default)]
    pub dropped_wiring: usize,
}

impl InstanceGraph {
    pub fn new(source_file: impl Into<PathBuf>, function_name: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            function_name: function_name.into(),
            ..Default::default()
        }
    }

    /// Insert a node, updating the name index and initializing its
    /// adjacency entries.
    pub fn add_node(&mut self, node: InstanceNode) {
        self.name_to_id.insert(node.name.clone(), node.id.clone());
        self.outgoing.entry(node.id.clone()).or_default();
        self.incoming.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge and record it in both adjacency indices.
    pub fn add_edge(&mut self, edge: WiringEdge) {
        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.target_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
    }

    pub fn get_node(&self, id: &str) -> Option<&InstanceNode> {
        self.nodes.get(id)
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<&InstanceNode> {
        self.name_to_id.get(name).and_then(|id| self.nodes.get(id))
    }

    pub fn get_edge(&self, id: &str) -> Option<&WiringEdge> {
        self.edges.get(id)
    }

    pub fn get_outgoing_edges(&self, node_id: &str) -> Vec<&WiringEdge> {
        self.outgoing
            .get(node_id)
            .map(|ids| ids.iter().filter_map(|id| self.edges.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_incoming_edges(&self, node_id: &str) -> Vec<&WiringEdge> {
        self.incoming
            .get(node_id)
            .map(|ids| ids.iter().filter_map(|id| self.edges.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &InstanceNode> {
        self.nodes.values()
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = &WiringEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes with no incoming edges, sorted by name.
    pub fn find_sources(&self) -> Vec<&InstanceNode> {
        let mut sources: Vec<&InstanceNode> = self
            .nodes
            .values()
            .filter(|n| self.incoming.get(&n.id).map_or(true, |e| e.is_empty()))
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    /// Nodes with no outgoing edges, sorted by name.
    pub fn find_sinks(&self) -> Vec<&InstanceNode> {
        let mut sinks: Vec<&InstanceNode> = self
            .nodes
            .values()
            .filter(|n| self.outgoing.get(&n.id).map_or(true, |e| e.is_empty()))
            .collect();
        sinks.sort_by(|a, b| a.name.cmp(&b.name));
        sinks
    }

    /// Kahn's algorithm. Returns `Err(CycleDetected)` when the graph
    /// contains a cycle instead of a partial order.
    pub fn topological_sort(&self) -> Result<Vec<&InstanceNode>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| {
                let degree = self.incoming.get(id.as_str()).map_or(0, |e| e.len());
                (id.as_str(), degree)
            })
            .collect();

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_by_key(|id| self.nodes.get(*id).map(|n| n.name.as_str()));

        let mut order: Vec<&InstanceNode> = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop() {
            if let Some(node) = self.nodes.get(id) {
                order.push(node);
            }
            if let Some(edge_ids) = self.outgoing.get(id) {
                for edge_id in edge_ids {
                    let Some(edge) = self.edges.get(edge_id) else {
                        continue;
                    };
                    if let Some(degree) = in_degree.get_mut(edge.target_id.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(edge.target_id.as_str());
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(WiremapError::CycleDetected);
        }
        Ok(order)
    }

    /// Serialize to the plain record form. Nodes and edges are emitted in a
    /// stable order so identical graphs produce identical records.
    pub fn to_data(&self) -> GraphData {
        let mut nodes: Vec<InstanceNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut edges: Vec<WiringEdge> = self.edges.values().cloned().collect();
        edges.sort_by(|a, b| (a.location.line, &a.id).cmp(&(b.location.line, &b.id)));

        GraphData {
            nodes,
            edges,
            source_file: self.source_file.clone(),
            function_name: self.function_name.clone(),
            dropped_wiring: self.dropped_wiring,
        }
    }

    /// Rebuild a graph from its record form. Edges whose endpoints are
    /// missing from the node set are skipped to keep the no-dangling-edge
    /// invariant even for hand-edited or damaged records.
    pub fn from_data(data: GraphData) -> Self {
        let mut graph = InstanceGraph::new(data.source_file, data.function_name);
        graph.dropped_wiring = data.dropped_wiring;

        for node in data.nodes {
            graph.add_node(node);
        }
        for edge in data.edges {
            if !graph.nodes.contains_key(&edge.source_id) || !graph.nodes.contains_key(&edge.target_id)
            {
                warn!(edge_id = %edge.id, "skipping edge with unresolved endpoint");
                continue;
            }
            graph.add_edge(edge);
        }
        graph
    }
}
