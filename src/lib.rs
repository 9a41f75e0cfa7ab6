pub mod builder;
pub mod error;
pub mod extract;
pub mod graph;
pub mod model;
pub mod service;
pub mod store;
pub mod syntax;
pub mod viz;
pub mod walker;
pub mod watcher;

pub use builder::GraphBuilder;
pub use error::{Result, WiremapError};
pub use extract::{
    CompositionExtractor, CppExtractor, ExtractorRegistry, PythonExtractor, TypeScriptExtractor,
};
pub use graph::{GraphData, InstanceGraph};
pub use model::{
    CompositionRoot, CreationPattern, InstanceInfo, InstanceNode, InstanceRole, LifecycleCall,
    LifecycleMethod, Location, NodeConfig, WiringEdge, WiringInfo,
};
pub use service::{ChangeSummary, GraphService, GraphSummary};
pub use store::{GraphStore, StoredInstanceGraph, STORE_VERSION};
pub use viz::{flow_layout, FlowLayout};
pub use walker::{RootScanner, ScannedRoot};
pub use watcher::FileWatcher;
