use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use wiremap::{flow_layout, ExtractorRegistry, FileWatcher, GraphService, InstanceGraph, RootScanner};

#[derive(Parser)]
#[command(name = "wiremap")]
#[command(about = "Extract instance wiring graphs from composition roots")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Extract the instance graph from a file's main()
    wiremap extract src/main.cpp

    # Extract from a specific composition root
    wiremap extract app/bootstrap.py --function create_app

    # Emit the graph as JSON or as a positioned flow payload
    wiremap extract src/index.ts --function __module__ --format json

    # List composition roots in one file
    wiremap roots src/main.cpp

    # Find composition roots across a project
    wiremap scan .

    # Show cached graphs for the project
    wiremap list

    # Watch for changes and keep the cache fresh
    wiremap watch .
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root used for cache identity and persistence
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the instance graph from a source file
    Extract {
        /// Source file to analyze
        file: PathBuf,
        /// Composition root function (defaults to main)
        #[arg(long)]
        function: Option<String>,
        /// Bypass the cache and re-extract
        #[arg(long)]
        refresh: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List composition-root functions in a file
    Roots {
        file: PathBuf,
    },
    /// Walk a directory and report files containing composition roots
    Scan {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Show cached graphs for the project
    List,
    /// Watch a directory and keep cached graphs fresh
    Watch {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Flow,
}

pub async fn extract(
    root: &Path,
    file: &Path,
    function: Option<&str>,
    refresh: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let service = GraphService::new(root);
    service.startup().await?;

    let graph = service.get_graph(file, function, refresh).await;
    let result = match graph {
        Some(graph) => print_graph(&graph, format),
        None => Err(anyhow::anyhow!(
            "no composition root found in {} (function: {})",
            file.display(),
            function.unwrap_or("main")
        )),
    };

    service.shutdown().await?;
    result
}

fn print_graph(graph: &InstanceGraph, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&graph.to_data())?);
        }
        OutputFormat::Flow => {
            println!("{}", serde_json::to_string_pretty(&flow_layout(graph))?);
        }
        OutputFormat::Text => {
            println!(
                "{} ({}): {} instances, {} wiring edges",
                graph.source_file.display(),
                graph.function_name,
                graph.node_count(),
                graph.edge_count(),
            );
            if graph.dropped_wiring > 0 {
                println!("  {} wiring calls had unresolved endpoints", graph.dropped_wiring);
            }

            let nodes = match graph.topological_sort() {
                Ok(order) => order,
                Err(_) => {
                    println!("  (wiring contains a cycle)");
                    graph.find_sources().into_iter().chain(graph.iter_nodes()).collect()
                }
            };
            let mut seen = std::collections::HashSet::new();
            for node in nodes {
                if seen.insert(&node.id) {
                    println!(
                        "  {} ({}) [{}] line {}",
                        node.name,
                        node.type_symbol,
                        node.role.as_str(),
                        node.location.line
                    );
                }
            }
            for edge in graph.iter_edges() {
                let source = graph.get_node(&edge.source_id).map(|n| n.name.as_str());
                let target = graph.get_node(&edge.target_id).map(|n| n.name.as_str());
                if let (Some(source), Some(target)) = (source, target) {
                    println!("  {} -{}-> {}", source, edge.method, target);
                }
            }
        }
    }
    Ok(())
}

pub fn roots(file: &Path) -> anyhow::Result<()> {
    let registry = ExtractorRegistry::new();
    let Some(extractor) = registry.get_for_file(file) else {
        anyhow::bail!("unsupported file type: {}", file.display());
    };
    if !extractor.is_available() {
        anyhow::bail!("parser unavailable for {}", extractor.language_id());
    }

    let roots = extractor.find_composition_roots(file);
    if roots.is_empty() {
        println!("No composition roots found in {}", file.display());
    } else {
        for root in roots {
            println!("{}", root);
        }
    }
    Ok(())
}

pub fn scan(path: &Path) -> anyhow::Result<()> {
    let scanner = RootScanner::new(ExtractorRegistry::new());
    let scanned = scanner.scan(path)?;

    if scanned.is_empty() {
        println!("No composition roots found under {}", path.display());
        return Ok(());
    }
    for entry in scanned {
        println!(
            "{} ({}): {}",
            entry.file.display(),
            entry.language,
            entry.roots.join(", ")
        );
    }
    Ok(())
}

pub async fn list(root: &Path) -> anyhow::Result<()> {
    let service = GraphService::new(root);
    service.startup().await?;

    let summaries = service.list_graphs();
    if summaries.is_empty() {
        println!("No cached graphs");
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{}  {} ({}) - {} nodes, {} edges",
            summary.id,
            summary.source_file.display(),
            summary.function_name,
            summary.node_count,
            summary.edge_count,
        );
    }
    Ok(())
}

pub async fn watch(root: &Path, path: &Path) -> anyhow::Result<()> {
    let service = GraphService::new(root);
    service.startup().await?;

    let mut watcher = FileWatcher::new(path)?;
    println!("Watching {} for changes (Ctrl-C to stop)", path.display());

    loop {
        let batch = tokio::task::spawn_blocking(move || {
            let files = watcher.recv();
            (watcher, files)
        });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            joined = batch => {
                let (returned, files) = joined?;
                watcher = returned;
                if let Some(files) = files {
                    let summary = service.handle_file_changes(&files).await;
                    if summary.analyzable_changed > 0 {
                        println!(
                            "{} analyzable files changed, {} graphs invalidated, {} refreshed",
                            summary.analyzable_changed,
                            summary.invalidated.len(),
                            summary.refreshed.len(),
                        );
                    }
                }
            }
        }
    }

    service.shutdown().await?;
    Ok(())
}
