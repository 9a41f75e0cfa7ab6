//! JSON-file persistence for instance graphs.
//!
//! One store file per project root at `.wiremap/instance-graphs.json`.
//! Saves are atomic (temp file + rename); loads are permissive: a missing,
//! corrupt, or version-mismatched file degrades to an empty list, and a
//! malformed entry is skipped rather than aborting the load.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::graph::{GraphData, InstanceGraph};

pub const STORE_VERSION: &str = "1.0";
pub const META_DIR_NAME: &str = ".wiremap";
const STORE_FILE: &str = "instance-graphs.json";

/// A persisted instance graph with the metadata needed for cache
/// invalidation on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInstanceGraph {
    pub id: String,
    pub project_path: String,
    pub source_file: String,
    pub function_name: String,
    pub analyzed_at: DateTime<Utc>,
    pub source_modified_at: DateTime<Utc>,
    #[serde(default)]
    pub node_count: usize,
    #[serde(default)]
    pub edge_count: usize,
    pub graph_data: GraphData,
}

impl StoredInstanceGraph {
    pub fn from_graph(
        id: impl Into<String>,
        project_path: impl Into<String>,
        source_file: impl Into<String>,
        graph: &InstanceGraph,
        source_modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            project_path: project_path.into(),
            source_file: source_file.into(),
            function_name: graph.function_name.clone(),
            analyzed_at: Utc::now(),
            source_modified_at,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            graph_data: graph.to_data(),
        }
    }
}

#[derive(Serialize)]
struct StorePayload<'a> {
    version: &'a str,
    project_path: String,
    updated_at: DateTime<Utc>,
    graphs: &'a [StoredInstanceGraph],
}

/// Loose shape for reading: tolerates unknown fields, a missing version,
/// and entries we cannot decode.
#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    graphs: Vec<serde_json::Value>,
}

pub struct GraphStore {
    root: PathBuf,
    meta_dir: PathBuf,
    store_path: PathBuf,
}

impl GraphStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let meta_dir = root.join(META_DIR_NAME);
        let store_path = meta_dir.join(STORE_FILE);
        Self {
            root,
            meta_dir,
            store_path,
        }
    }

    /// Store with an alternative cache directory, for read-only project
    /// mounts.
    pub fn with_cache_dir(root: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let meta_dir: PathBuf = cache_dir.into();
        let store_path = meta_dir.join(STORE_FILE);
        Self {
            root,
            meta_dir,
            store_path,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Load stored graphs; empty on missing or unreadable data.
    pub fn load(&self) -> Vec<StoredInstanceGraph> {
        if !self.store_path.exists() {
            debug!(path = %self.store_path.display(), "no stored graphs");
            return Vec::new();
        }

        let payload: RawPayload = match fs::read_to_string(&self.store_path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_str(&data).map_err(|e| e.to_string()))
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %self.store_path.display(), error = %e, "failed to load stored graphs");
                return Vec::new();
            }
        };

        if payload.version.as_deref() != Some(STORE_VERSION) {
            // best-effort forward compatibility, not a rejection
            warn!(
                expected = STORE_VERSION,
                found = payload.version.as_deref().unwrap_or("<missing>"),
                "storage version mismatch"
            );
        }

        let mut graphs = Vec::new();
        for entry in payload.graphs {
            match serde_json::from_value::<StoredInstanceGraph>(entry) {
                Ok(graph) => graphs.push(graph),
                Err(e) => warn!(error = %e, "skipping malformed stored graph entry"),
            }
        }

        info!(
            count = graphs.len(),
            path = %self.store_path.display(),
            "loaded stored graphs"
        );
        graphs
    }

    /// Persist graphs atomically. I/O failures propagate after the temp
    /// file is cleaned up, so callers see data loss instead of silence.
    pub fn save(&self, graphs: &[StoredInstanceGraph]) -> Result<()> {
        let payload = StorePayload {
            version: STORE_VERSION,
            project_path: self.root.display().to_string(),
            updated_at: Utc::now(),
            graphs,
        };
        let json = serde_json::to_string_pretty(&payload)?;

        fs::create_dir_all(&self.meta_dir)?;

        let temp_path = self.store_path.with_extension("tmp");
        let written = fs::write(&temp_path, json)
            .and_then(|_| fs::rename(&temp_path, &self.store_path));
        if let Err(e) = written {
            error!(path = %self.store_path.display(), error = %e, "failed to save graphs");
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        info!(
            count = graphs.len(),
            path = %self.store_path.display(),
            "saved graphs"
        );
        Ok(())
    }

    /// Remove the store file. Returns whether anything was deleted.
    pub fn delete(&self) -> Result<bool> {
        if self.store_path.exists() {
            fs::remove_file(&self.store_path)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn exists(&self) -> bool {
        self.store_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceNode, InstanceRole, Location};
    use tempfile::TempDir;

    fn sample_graph() -> InstanceGraph {
        let mut graph = InstanceGraph::new("/project/main.cpp", "main");
        graph.add_node(InstanceNode {
            id: "n1".to_string(),
            name: "m1".to_string(),
            type_symbol: "GeneratorModule".to_string(),
            role: InstanceRole::Source,
            location: Location::new("/project/main.cpp", 10, 4),
            args: Vec::new(),
            config: Default::default(),
        });
        graph
    }

    fn sample_stored(id: &str) -> StoredInstanceGraph {
        StoredInstanceGraph::from_graph(id, "/project", "main.cpp", &sample_graph(), Utc::now())
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());

        store.save(&[sample_stored("g1"), sample_stored("g2")]).unwrap();
        let loaded = store.load();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "g1");
        assert_eq!(loaded[0].node_count, 1);
        assert_eq!(loaded[0].graph_data.nodes.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());

        std::fs::create_dir_all(dir.path().join(META_DIR_NAME)).unwrap();
        std::fs::write(store.store_path(), "{not json").unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_version_mismatch_still_loads() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());
        store.save(&[sample_stored("g1")]).unwrap();

        // rewrite with a future version string
        let text = std::fs::read_to_string(store.store_path()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["version"] = serde_json::json!("9.9");
        std::fs::write(store.store_path(), value.to_string()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_load_skips_malformed_entry() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());
        store.save(&[sample_stored("g1")]).unwrap();

        let text = std::fs::read_to_string(store.store_path()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["graphs"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"id": 42}));
        std::fs::write(store.store_path(), value.to_string()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "g1");
    }

    #[test]
    fn test_load_tolerates_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());
        store.save(&[sample_stored("g1")]).unwrap();

        let text = std::fs::read_to_string(store.store_path()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["future_field"] = serde_json::json!({"anything": true});
        std::fs::write(store.store_path(), value.to_string()).unwrap();

        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());
        store.save(&[sample_stored("g1")]).unwrap();

        let temp = store.store_path().with_extension("tmp");
        assert!(!temp.exists());
        assert!(store.exists());
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::new(dir.path());

        assert!(!store.delete().unwrap());
        store.save(&[]).unwrap();
        assert!(store.delete().unwrap());
        assert!(!store.exists());
    }

    #[test]
    fn test_stored_graph_round_trips_graph_data() {
        let graph = sample_graph();
        let stored = StoredInstanceGraph::from_graph("g", "/p", "main.cpp", &graph, Utc::now());

        let restored = InstanceGraph::from_data(stored.graph_data.clone());
        assert_eq!(restored.node_count(), 1);
        assert!(restored.get_node_by_name("m1").is_some());
    }
}
