//! Graph service: extraction orchestration with a freshness-keyed cache.
//!
//! Cache entries are keyed by a stable graph id (project + relative file +
//! function) and carry the source file's modification time at extraction.
//! A lookup re-extracts only when the file has changed or a refresh is
//! forced. Concurrent requests for the same id may both extract; the last
//! write wins (best-effort duplicate work, by documented choice).

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::GraphBuilder;
use crate::error::Result;
use crate::extract::ExtractorRegistry;
use crate::graph::InstanceGraph;
use crate::store::{GraphStore, StoredInstanceGraph};

/// How many invalidated graphs `handle_file_changes` re-extracts eagerly.
const EAGER_REFRESH_LIMIT: usize = 4;

struct CacheEntry {
    graph: Arc<InstanceGraph>,
    modified_at: DateTime<Utc>,
}

/// Read-only view of one cached graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub id: String,
    pub source_file: PathBuf,
    pub function_name: String,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Outcome of a batch of file-change notifications.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSummary {
    pub invalidated: Vec<String>,
    pub refreshed: Vec<String>,
    pub analyzable_changed: usize,
}

pub struct GraphService {
    root: PathBuf,
    store: GraphStore,
    registry: ExtractorRegistry,
    builder: GraphBuilder,
    started: RwLock<bool>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    file_deps: RwLock<HashMap<String, HashSet<PathBuf>>>,
}

impl GraphService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let store = GraphStore::new(&root);
        Self {
            root,
            store,
            registry: ExtractorRegistry::new(),
            builder: GraphBuilder::new(),
            started: RwLock::new(false),
            cache: RwLock::new(HashMap::new()),
            file_deps: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Load the store and rehydrate graphs whose source files still exist.
    /// Idempotent.
    pub async fn startup(&self) -> Result<()> {
        {
            let started = self.started.read().unwrap();
            if *started {
                return Ok(());
            }
        }

        let stored = self.store.load();
        let mut restored = 0usize;
        {
            let mut cache = self.cache.write().unwrap();
            let mut deps = self.file_deps.write().unwrap();
            for entry in stored {
                let source = self.absolute_source(&entry.source_file);
                if !source.exists() {
                    debug!(
                        source = %source.display(),
                        id = %entry.id,
                        "skipping stored graph for missing source"
                    );
                    continue;
                }
                let graph = InstanceGraph::from_data(entry.graph_data);
                cache.insert(
                    entry.id.clone(),
                    CacheEntry {
                        graph: Arc::new(graph),
                        modified_at: entry.source_modified_at,
                    },
                );
                deps.insert(entry.id, HashSet::from([source]));
                restored += 1;
            }
        }

        *self.started.write().unwrap() = true;
        info!(restored, root = %self.root.display(), "graph service started");
        Ok(())
    }

    /// Persist the cache to the store, then clear it. Idempotent. A failed
    /// save propagates before anything is cleared.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let started = self.started.read().unwrap();
            if !*started {
                return Ok(());
            }
        }

        let graphs: Vec<StoredInstanceGraph> = {
            let cache = self.cache.read().unwrap();
            cache
                .iter()
                .map(|(id, entry)| {
                    StoredInstanceGraph::from_graph(
                        id.clone(),
                        self.root.display().to_string(),
                        self.relative_source(&entry.graph.source_file),
                        &entry.graph,
                        entry.modified_at,
                    )
                })
                .collect()
        };
        self.store.save(&graphs)?;

        self.cache.write().unwrap().clear();
        self.file_deps.write().unwrap().clear();
        *self.started.write().unwrap() = false;
        info!(persisted = graphs.len(), "graph service stopped");
        Ok(())
    }

    /// Get the instance graph for a file, extracting on cache miss. Returns
    /// `None` when no extractor matches, the extractor is unavailable, or
    /// extraction fails; a failed extraction leaves any cached entry alone.
    pub async fn get_graph(
        &self,
        file: &Path,
        function_name: Option<&str>,
        force_refresh: bool,
    ) -> Option<Arc<InstanceGraph>> {
        let extractor = self.registry.get_for_file(file)?;
        if !extractor.is_available() {
            debug!(language = extractor.language_id(), "extractor unavailable");
            return None;
        }

        let resolved = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
        let function = function_name.unwrap_or("main");
        let graph_id = self.graph_id(&resolved, function);
        let mtime = file_mtime(&resolved)?;

        if !force_refresh {
            let cache = self.cache.read().unwrap();
            if let Some(entry) = cache.get(&graph_id) {
                if entry.modified_at >= mtime {
                    debug!(id = %graph_id, "cache hit");
                    return Some(entry.graph.clone());
                }
            }
        }

        let root = extractor.extract(&resolved, function_name)?;
        let graph = Arc::new(self.builder.build(&root));
        debug!(
            id = %graph_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dropped = graph.dropped_wiring,
            "extracted graph"
        );

        self.cache.write().unwrap().insert(
            graph_id.clone(),
            CacheEntry {
                graph: graph.clone(),
                modified_at: mtime,
            },
        );
        self.file_deps
            .write()
            .unwrap()
            .insert(graph_id, HashSet::from([resolved]));

        Some(graph)
    }

    /// Evict every cached graph depending on the file. Returns the evicted
    /// ids; empty (and a no-op) for non-analyzable files.
    pub async fn invalidate_for_file(&self, file: &Path) -> Vec<String> {
        if !self.registry.is_analyzable(file) {
            return Vec::new();
        }
        let resolved = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());

        let mut cache = self.cache.write().unwrap();
        let mut deps = self.file_deps.write().unwrap();

        let ids: Vec<String> = deps
            .iter()
            .filter(|(_, files)| files.contains(&resolved))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            cache.remove(id);
            deps.remove(id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), file = %resolved.display(), "invalidated graphs");
        }
        ids
    }

    /// Process a batch of changed files: invalidate affected graphs, then
    /// eagerly re-extract a bounded subset of them.
    pub async fn handle_file_changes(&self, files: &[PathBuf]) -> ChangeSummary {
        let mut summary = ChangeSummary::default();

        let analyzable: Vec<&PathBuf> = files
            .iter()
            .filter(|f| self.registry.is_analyzable(f))
            .collect();
        summary.analyzable_changed = analyzable.len();

        // remember what to rebuild before eviction drops the metadata
        let mut refresh_targets: Vec<(PathBuf, String)> = Vec::new();
        for file in analyzable {
            {
                let resolved = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
                let cache = self.cache.read().unwrap();
                let deps = self.file_deps.read().unwrap();
                for (id, dep_files) in deps.iter() {
                    if dep_files.contains(&resolved) {
                        if let Some(entry) = cache.get(id) {
                            refresh_targets.push((
                                entry.graph.source_file.clone(),
                                entry.graph.function_name.clone(),
                            ));
                        }
                    }
                }
            }
            summary.invalidated.extend(self.invalidate_for_file(file).await);
        }

        for (source, function) in refresh_targets.into_iter().take(EAGER_REFRESH_LIMIT) {
            match self.get_graph(&source, Some(&function), true).await {
                Some(_) => {
                    let resolved = source.canonicalize().unwrap_or(source);
                    summary.refreshed.push(self.graph_id(&resolved, &function));
                }
                None => warn!(source = %source.display(), "eager refresh failed"),
            }
        }

        summary
    }

    /// Cached graph summaries, sorted by id. Never triggers extraction.
    pub fn list_graphs(&self) -> Vec<GraphSummary> {
        let cache = self.cache.read().unwrap();
        let mut summaries: Vec<GraphSummary> = cache
            .iter()
            .map(|(id, entry)| GraphSummary {
                id: id.clone(),
                source_file: entry.graph.source_file.clone(),
                function_name: entry.graph.function_name.clone(),
                node_count: entry.graph.node_count(),
                edge_count: entry.graph.edge_count(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Cached graph by id. Never triggers extraction.
    pub fn get_cached_graph(&self, id: &str) -> Option<Arc<InstanceGraph>> {
        self.cache.read().unwrap().get(id).map(|e| e.graph.clone())
    }

    /// Stable cache identity: project root + root-relative path + function.
    fn graph_id(&self, resolved: &Path, function: &str) -> String {
        let relative = resolved
            .strip_prefix(&self.root)
            .unwrap_or(resolved)
            .display()
            .to_string();

        let mut hasher = DefaultHasher::new();
        self.root.display().to_string().hash(&mut hasher);
        relative.hash(&mut hasher);
        function.hash(&mut hasher);
        format!("ig:{:016x}", hasher.finish())
    }

    fn absolute_source(&self, source_file: &str) -> PathBuf {
        let path = PathBuf::from(source_file);
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }

    fn relative_source(&self, source_file: &Path) -> String {
        source_file
            .strip_prefix(&self.root)
            .unwrap_or(source_file)
            .display()
            .to_string()
    }
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from)
}
