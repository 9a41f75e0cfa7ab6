//! Converts a flat `CompositionRoot` into an `InstanceGraph`.
//!
//! Node and edge ids are fresh UUIDs on every build; only the service-level
//! graph id is stable across builds.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::graph::InstanceGraph;
use crate::model::{
    CompositionRoot, InstanceInfo, InstanceNode, InstanceRole, NodeConfig, WiringEdge, WiringInfo,
};

#[derive(Debug, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a graph: one node per instance, one edge per wiring record
    /// whose endpoints both resolve, then infer roles from the finished
    /// adjacency maps so insertion order never affects the result.
    pub fn build(&self, root: &CompositionRoot) -> InstanceGraph {
        let mut graph = InstanceGraph::new(&root.file_path, &root.function_name);

        for instance in &root.instances {
            graph.add_node(self.create_node(instance));
        }

        for wiring in &root.wiring {
            match self.create_edge(wiring, &graph.name_to_id) {
                Some(edge) => graph.add_edge(edge),
                None => {
                    graph.dropped_wiring += 1;
                    debug!(
                        source = %wiring.source,
                        target = %wiring.target,
                        "dropping wiring with unresolved endpoint"
                    );
                }
            }
        }

        self.infer_roles(&mut graph);
        graph
    }

    fn create_node(&self, instance: &InstanceInfo) -> InstanceNode {
        let mut type_symbol = instance
            .actual_type
            .clone()
            .unwrap_or_else(|| instance.declared_type.clone());

        if instance.actual_type.is_none() {
            if let Some(factory) = &instance.factory_name {
                if let Some(symbol) = type_symbol_from_factory(factory) {
                    type_symbol = symbol;
                }
            }
        }

        InstanceNode {
            id: Uuid::new_v4().to_string(),
            name: instance.name.clone(),
            type_symbol,
            role: InstanceRole::Unknown,
            location: instance.location.clone(),
            args: instance.constructor_args.clone(),
            config: NodeConfig {
                creation_pattern: Some(instance.creation_pattern),
                factory_name: instance.factory_name.clone(),
                is_pointer: instance.is_pointer,
                pointer_type: instance.pointer_type.clone(),
            },
        }
    }

    fn create_edge(
        &self,
        wiring: &WiringInfo,
        name_to_id: &HashMap<String, String>,
    ) -> Option<WiringEdge> {
        let source_id = name_to_id.get(&wiring.source)?.clone();
        let target_id = name_to_id.get(&wiring.target)?.clone();

        let mut metadata = std::collections::BTreeMap::new();
        if let Some(kind) = &wiring.wiring_kind {
            metadata.insert("wiring_kind".to_string(), kind.clone());
        }

        Some(WiringEdge {
            id: Uuid::new_v4().to_string(),
            source_id,
            target_id,
            method: wiring.method.clone(),
            location: wiring.location.clone(),
            metadata,
        })
    }

    fn infer_roles(&self, graph: &mut InstanceGraph) {
        let roles: Vec<(String, InstanceRole)> = graph
            .nodes
            .keys()
            .map(|id| {
                let has_incoming = graph.incoming.get(id).map_or(false, |e| !e.is_empty());
                let has_outgoing = graph.outgoing.get(id).map_or(false, |e| !e.is_empty());
                let role = match (has_incoming, has_outgoing) {
                    (true, true) => InstanceRole::Processing,
                    (false, true) => InstanceRole::Source,
                    (true, false) => InstanceRole::Sink,
                    (false, false) => InstanceRole::Unknown,
                };
                (id.clone(), role)
            })
            .collect();

        for (id, role) in roles {
            if let Some(node) = graph.nodes.get_mut(&id) {
                node.role = role;
            }
        }
    }
}

/// Infer a type symbol from a factory name by stripping a recognized
/// `create`/`make`/`build` prefix. Handles both camelCase
/// (`createGeneratorModule` -> `GeneratorModule`) and snake_case
/// (`create_generator` -> `Generator`).
fn type_symbol_from_factory(factory: &str) -> Option<String> {
    for prefix in ["create", "make", "build"] {
        let Some(rest) = factory.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            return None;
        }
        if let Some(snake) = rest.strip_prefix('_') {
            let symbol: String = snake
                .split('_')
                .filter(|seg| !seg.is_empty())
                .map(capitalize)
                .collect();
            return if symbol.is_empty() { None } else { Some(symbol) };
        }
        if rest.chars().next().is_some_and(|c| c.is_uppercase()) {
            return Some(rest.to_string());
        }
        // e.g. "creator" is not a factory prefix match
        return None;
    }
    None
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreationPattern, Location, WiringInfo};

    fn loc(line: u32) -> Location {
        Location::new("/test/main.cpp", line, 4)
    }

    fn root_with(instances: Vec<InstanceInfo>, wiring: Vec<WiringInfo>) -> CompositionRoot {
        let mut root = CompositionRoot::new("/test/main.cpp", "main", loc(1));
        root.instances = instances;
        root.wiring = wiring;
        root
    }

    fn factory_instance(name: &str, factory: &str, line: u32) -> InstanceInfo {
        InstanceInfo::new(name, "auto", loc(line), CreationPattern::Factory).with_factory(factory)
    }

    #[test]
    fn test_build_counts_nodes_and_edges() {
        let root = root_with(
            vec![
                factory_instance("m1", "createGenerator", 10),
                factory_instance("m2", "createFilter", 11),
                factory_instance("m3", "createPrinter", 12),
            ],
            vec![
                WiringInfo::new("m1", "m2", "setNext", loc(20)),
                WiringInfo::new("m2", "m3", "setNext", loc(21)),
            ],
        );

        let graph = GraphBuilder::new().build(&root);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dropped_wiring, 0);
    }

    #[test]
    fn test_build_drops_unresolved_wiring() {
        let root = root_with(
            vec![factory_instance("m1", "createGenerator", 10)],
            vec![WiringInfo::new("m1", "outside", "connect", loc(20))],
        );

        let graph = GraphBuilder::new().build(&root);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.dropped_wiring, 1);
    }

    #[test]
    fn test_role_inference_chain() {
        let root = root_with(
            vec![
                factory_instance("m1", "createGenerator", 10),
                factory_instance("m2", "createFilter", 11),
                factory_instance("m3", "createPrinter", 12),
            ],
            vec![
                WiringInfo::new("m1", "m2", "setNext", loc(20)),
                WiringInfo::new("m2", "m3", "setNext", loc(21)),
            ],
        );

        let graph = GraphBuilder::new().build(&root);
        assert_eq!(
            graph.get_node_by_name("m1").unwrap().role,
            InstanceRole::Source
        );
        assert_eq!(
            graph.get_node_by_name("m2").unwrap().role,
            InstanceRole::Processing
        );
        assert_eq!(
            graph.get_node_by_name("m3").unwrap().role,
            InstanceRole::Sink
        );
    }

    #[test]
    fn test_role_inference_isolated_node() {
        let root = root_with(vec![factory_instance("alone", "createThing", 10)], vec![]);

        let graph = GraphBuilder::new().build(&root);
        assert_eq!(
            graph.get_node_by_name("alone").unwrap().role,
            InstanceRole::Unknown
        );
    }

    #[test]
    fn test_type_symbol_prefers_actual_type() {
        let instance = InstanceInfo::new(
            "m1",
            "auto",
            loc(10),
            CreationPattern::SmartPointerUnique,
        )
        .with_actual_type("ConcreteModule")
        .with_factory("createGeneratorModule");

        let root = root_with(vec![instance], vec![]);
        let graph = GraphBuilder::new().build(&root);
        assert_eq!(
            graph.get_node_by_name("m1").unwrap().type_symbol,
            "ConcreteModule"
        );
    }

    #[test]
    fn test_type_symbol_from_camel_factory() {
        let root = root_with(
            vec![factory_instance("m1", "createGeneratorModule", 10)],
            vec![],
        );
        let graph = GraphBuilder::new().build(&root);
        assert_eq!(
            graph.get_node_by_name("m1").unwrap().type_symbol,
            "GeneratorModule"
        );
    }

    #[test]
    fn test_type_symbol_from_snake_factory() {
        let root = root_with(vec![factory_instance("gen", "create_generator", 10)], vec![]);
        let graph = GraphBuilder::new().build(&root);
        assert_eq!(graph.get_node_by_name("gen").unwrap().type_symbol, "Generator");
    }

    #[test]
    fn test_type_symbol_factory_without_prefix_keeps_declared() {
        let root = root_with(vec![factory_instance("w", "widget_factory", 10)], vec![]);
        let graph = GraphBuilder::new().build(&root);
        assert_eq!(graph.get_node_by_name("w").unwrap().type_symbol, "auto");
    }

    #[test]
    fn test_node_ids_fresh_per_build() {
        let root = root_with(vec![factory_instance("m1", "createGenerator", 10)], vec![]);
        let builder = GraphBuilder::new();
        let a = builder.build(&root);
        let b = builder.build(&root);
        assert_ne!(
            a.get_node_by_name("m1").unwrap().id,
            b.get_node_by_name("m1").unwrap().id
        );
    }

    #[test]
    fn test_edge_metadata_carries_wiring_kind() {
        let mut wiring = WiringInfo::new("m1", "m2", "subscribe", loc(20));
        wiring.wiring_kind = Some("observer".to_string());
        let root = root_with(
            vec![
                factory_instance("m1", "createBus", 10),
                factory_instance("m2", "createHandler", 11),
            ],
            vec![wiring],
        );

        let graph = GraphBuilder::new().build(&root);
        let edge = graph.iter_edges().next().unwrap();
        assert_eq!(edge.metadata.get("wiring_kind").map(String::as_str), Some("observer"));
    }
}
