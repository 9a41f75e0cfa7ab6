//! Project scanner: walks a tree (gitignore-aware) and reports which
//! analyzable files contain composition roots.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::Serialize;

use crate::error::Result;
use crate::extract::ExtractorRegistry;

/// A file with at least one composition root.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedRoot {
    pub file: PathBuf,
    pub language: String,
    pub roots: Vec<String>,
}

pub struct RootScanner {
    registry: ExtractorRegistry,
}

impl RootScanner {
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self { registry }
    }

    /// All analyzable files under `root`, honoring ignore files.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if path.is_file() && self.registry.is_analyzable(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Files under `root` that contain at least one composition root.
    pub fn scan(&self, root: &Path) -> Result<Vec<ScannedRoot>> {
        let mut scanned = Vec::new();

        for file in self.walk(root)? {
            let Some(extractor) = self.registry.get_for_file(&file) else {
                continue;
            };
            if !extractor.is_available() {
                continue;
            }
            let roots = extractor.find_composition_roots(&file);
            if !roots.is_empty() {
                scanned.push(ScannedRoot {
                    file,
                    language: extractor.language_id().to_string(),
                    roots,
                });
            }
        }
        Ok(scanned)
    }
}
