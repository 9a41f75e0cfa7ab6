//! Shared data model for composition-root extraction and graph building.
//!
//! Extractors produce the flat `CompositionRoot` form; the builder converts
//! it into `InstanceNode`/`WiringEdge` graph entities.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Source position of an extracted fact (1-based line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file_path: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file_path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
        }
    }
}

/// How an instance was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationPattern {
    Direct,
    Factory,
    SmartPointerUnique,
    SmartPointerShared,
    Unknown,
}

impl CreationPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationPattern::Direct => "direct",
            CreationPattern::Factory => "factory",
            CreationPattern::SmartPointerUnique => "smart_pointer_unique",
            CreationPattern::SmartPointerShared => "smart_pointer_shared",
            CreationPattern::Unknown => "unknown",
        }
    }
}

/// Conventional lifecycle operations recognized on instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleMethod {
    Init,
    Start,
    Stop,
    Shutdown,
    Connect,
    Disconnect,
}

impl LifecycleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleMethod::Init => "init",
            LifecycleMethod::Start => "start",
            LifecycleMethod::Stop => "stop",
            LifecycleMethod::Shutdown => "shutdown",
            LifecycleMethod::Connect => "connect",
            LifecycleMethod::Disconnect => "disconnect",
        }
    }
}

/// A declared object instance found in a composition-root body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub name: String,
    /// Type as written in the declaration (`auto`, `object` when untyped).
    pub declared_type: String,
    /// Concrete type resolved from the initializer, when known.
    pub actual_type: Option<String>,
    pub location: Location,
    pub creation_pattern: CreationPattern,
    pub factory_name: Option<String>,
    pub constructor_args: Vec<String>,
    pub is_pointer: bool,
    pub pointer_type: Option<String>,
}

impl InstanceInfo {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        location: Location,
        creation_pattern: CreationPattern,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            actual_type: None,
            location,
            creation_pattern,
            factory_name: None,
            constructor_args: Vec::new(),
            is_pointer: false,
            pointer_type: None,
        }
    }

    pub fn with_actual_type(mut self, actual_type: impl Into<String>) -> Self {
        self.actual_type = Some(actual_type.into());
        self
    }

    pub fn with_factory(mut self, factory_name: impl Into<String>) -> Self {
        self.factory_name = Some(factory_name.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn with_pointer(mut self, pointer_type: impl Into<String>) -> Self {
        self.is_pointer = true;
        self.pointer_type = Some(pointer_type.into());
        self
    }
}

/// A call that connects two declared instances, `source.method(target)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringInfo {
    pub source: String,
    pub target: String,
    pub method: String,
    pub location: Location,
    pub wiring_kind: Option<String>,
}

impl WiringInfo {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        method: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            method: method.into(),
            location,
            wiring_kind: None,
        }
    }
}

/// A lifecycle call in body order; `order` preserves cross-instance
/// interleaving so startup/teardown symmetry can be validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleCall {
    pub instance: String,
    pub method: LifecycleMethod,
    pub location: Location,
    pub order: u32,
}

/// Flat extraction result for one (file, entry function) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionRoot {
    pub file_path: PathBuf,
    pub function_name: String,
    pub location: Location,
    pub instances: Vec<InstanceInfo>,
    pub wiring: Vec<WiringInfo>,
    pub lifecycle: Vec<LifecycleCall>,
}

impl CompositionRoot {
    pub fn new(file_path: impl Into<PathBuf>, function_name: impl Into<String>, location: Location) -> Self {
        Self {
            file_path: file_path.into(),
            function_name: function_name.into(),
            location,
            instances: Vec::new(),
            wiring: Vec::new(),
            lifecycle: Vec::new(),
        }
    }

    /// Names of all declared instances, for wiring/lifecycle resolution.
    pub fn instance_names(&self) -> std::collections::HashSet<&str> {
        self.instances.iter().map(|i| i.name.as_str()).collect()
    }
}

/// Node role derived from edge connectivity, never set by extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceRole {
    Source,
    Sink,
    Processing,
    Unknown,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceRole::Source => "source",
            InstanceRole::Sink => "sink",
            InstanceRole::Processing => "processing",
            InstanceRole::Unknown => "unknown",
        }
    }
}

/// Creation details carried from `InstanceInfo` onto the graph node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub creation_pattern: Option<CreationPattern>,
    pub factory_name: Option<String>,
    pub is_pointer: bool,
    pub pointer_type: Option<String>,
}

/// Graph-level node; `id` is fresh per build and carries no cross-build
/// stability guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNode {
    pub id: String,
    pub name: String,
    pub type_symbol: String,
    pub role: InstanceRole,
    pub location: Location,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub config: NodeConfig,
}

/// Graph-level edge between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub method: String,
    pub location: Location,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_pattern_as_str() {
        assert_eq!(CreationPattern::Direct.as_str(), "direct");
        assert_eq!(
            CreationPattern::SmartPointerUnique.as_str(),
            "smart_pointer_unique"
        );
    }

    #[test]
    fn test_instance_info_builder() {
        let info = InstanceInfo::new(
            "m1",
            "auto",
            Location::new("/test/main.cpp", 10, 4),
            CreationPattern::Factory,
        )
        .with_factory("createGeneratorModule")
        .with_pointer("unique_ptr");

        assert_eq!(info.name, "m1");
        assert_eq!(info.factory_name.as_deref(), Some("createGeneratorModule"));
        assert!(info.is_pointer);
        assert_eq!(info.pointer_type.as_deref(), Some("unique_ptr"));
        assert!(info.actual_type.is_none());
    }

    #[test]
    fn test_composition_root_instance_names() {
        let loc = Location::new("/test/main.py", 1, 0);
        let mut root = CompositionRoot::new("/test/main.py", "main", loc.clone());
        root.instances.push(InstanceInfo::new(
            "gen",
            "object",
            loc.clone(),
            CreationPattern::Factory,
        ));
        root.instances.push(InstanceInfo::new(
            "sink",
            "object",
            loc,
            CreationPattern::Direct,
        ));

        let names = root.instance_names();
        assert!(names.contains("gen"));
        assert!(names.contains("sink"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_role_serde_round_trip() {
        let json = serde_json::to_string(&InstanceRole::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let back: InstanceRole = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InstanceRole::Processing);
    }

    #[test]
    fn test_lifecycle_method_serde() {
        let json = serde_json::to_string(&LifecycleMethod::Shutdown).unwrap();
        assert_eq!(json, "\"shutdown\"");
    }
}
