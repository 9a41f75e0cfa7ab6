//! Service-level flow through the public API: extraction, cache identity,
//! invalidation, and persistence across service instances.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use wiremap::{GraphService, InstanceRole};

const MAIN_CPP: &str = r#"
int main() {
    auto gen = createGenerator();
    auto sink = createSink();
    gen->setNext(sink.get());
    gen->start();
    gen->stop();
    return 0;
}
"#;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[tokio::test]
async fn test_extract_and_cache_flow() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "main.cpp", MAIN_CPP);

    let service = GraphService::new(dir.path());
    service.startup().await.unwrap();

    let graph = service.get_graph(&path, None, false).await.unwrap();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(
        graph.get_node_by_name("gen").unwrap().role,
        InstanceRole::Source
    );
    assert_eq!(
        graph.get_node_by_name("sink").unwrap().role,
        InstanceRole::Sink
    );

    // untouched file: the exact cached object comes back
    let again = service.get_graph(&path, None, false).await.unwrap();
    assert!(Arc::ptr_eq(&graph, &again));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalidation_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "main.cpp", MAIN_CPP);

    let service = GraphService::new(dir.path());
    service.startup().await.unwrap();
    service.get_graph(&path, None, false).await.unwrap();

    let id = service.list_graphs()[0].id.clone();

    let invalidated = service.invalidate_for_file(&path).await;
    assert_eq!(invalidated, vec![id.clone()]);
    assert!(service.get_cached_graph(&id).is_none());

    let again = service.invalidate_for_file(&path).await;
    assert!(again.is_empty());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_persistence_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "main.cpp", MAIN_CPP);

    let id = {
        let service = GraphService::new(dir.path());
        service.startup().await.unwrap();
        service.get_graph(&path, None, false).await.unwrap();
        let id = service.list_graphs()[0].id.clone();
        service.shutdown().await.unwrap();
        id
    };

    let service = GraphService::new(dir.path());
    service.startup().await.unwrap();

    let summaries = service.list_graphs();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, id);

    let graph = service.get_cached_graph(&id).unwrap();
    assert_eq!(graph.node_count(), 2);
    assert!(graph.get_node_by_name("gen").is_some());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_file_change_handling() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "main.cpp", MAIN_CPP);
    let readme = write_file(&dir, "README.md", "# demo");

    let service = GraphService::new(dir.path());
    service.startup().await.unwrap();
    service.get_graph(&path, None, false).await.unwrap();

    let summary = service.handle_file_changes(&[path.clone(), readme]).await;
    assert_eq!(summary.analyzable_changed, 1);
    assert_eq!(summary.invalidated.len(), 1);
    assert_eq!(summary.refreshed.len(), 1);

    // refreshed graph is back in the cache
    assert!(service.get_cached_graph(&summary.refreshed[0]).is_some());

    service.shutdown().await.unwrap();
}
