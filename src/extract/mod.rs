//! Composition-root extractors.
//!
//! One extractor per language family, all behind the
//! [`CompositionExtractor`] trait. The registry maps file extensions to
//! extractors so callers never branch on language at runtime.

pub mod cpp;
pub mod python;
pub mod typescript;

pub use cpp::CppExtractor;
pub use python::PythonExtractor;
pub use typescript::TypeScriptExtractor;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::CompositionRoot;

/// Marker recognized in a comment, docstring, or decorator immediately
/// preceding a function to declare it a composition root.
pub const ROOT_MARKER: &str = "@composition-root";

/// Callee-name patterns that identify factory functions across languages.
pub(crate) static FACTORY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^create[A-Z_]").unwrap(),
        Regex::new(r"^make[A-Z_]").unwrap(),
        Regex::new(r"^build[A-Z_]").unwrap(),
        Regex::new(r"Factory$").unwrap(),
        Regex::new(r"_factory$").unwrap(),
    ]
});

pub(crate) fn is_factory_name(name: &str) -> bool {
    FACTORY_PATTERNS.iter().any(|p| p.is_match(name))
}

pub trait CompositionExtractor: Send + Sync {
    fn language_id(&self) -> &'static str;

    /// Extensions handled by this extractor, lowercase, without the dot.
    fn file_extensions(&self) -> &[&'static str];

    /// True iff the grammar initialized successfully. Never errors.
    fn is_available(&self) -> bool;

    /// Function names in the file that qualify as composition roots.
    fn find_composition_roots(&self, path: &Path) -> Vec<String>;

    /// Extract a composition root, defaulting to `main`. Returns `None`
    /// when the target construct cannot be located or the file cannot be
    /// read.
    fn extract(&self, path: &Path, function_name: Option<&str>) -> Option<CompositionRoot>;
}

pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn CompositionExtractor>>,
    extension_map: HashMap<String, String>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: HashMap::new(),
            extension_map: HashMap::new(),
        };

        registry.register(Arc::new(CppExtractor::new()));
        registry.register(Arc::new(PythonExtractor::new()));
        registry.register(Arc::new(TypeScriptExtractor::new()));

        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn CompositionExtractor>) {
        let id = extractor.language_id().to_string();
        for ext in extractor.file_extensions() {
            self.extension_map.insert(ext.to_string(), id.clone());
        }
        self.extractors.insert(id, extractor);
    }

    pub fn get_by_language(&self, id: &str) -> Option<Arc<dyn CompositionExtractor>> {
        self.extractors.get(id).cloned()
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn CompositionExtractor>> {
        self.extension_map
            .get(&ext.to_lowercase())
            .and_then(|id| self.extractors.get(id))
            .cloned()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn CompositionExtractor>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get_by_extension(ext))
    }

    /// Whether any extractor handles this file's extension.
    pub fn is_analyzable(&self, path: &Path) -> bool {
        self.get_for_file(path).is_some()
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.extension_map.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_by_extension() {
        let registry = ExtractorRegistry::new();

        assert_eq!(
            registry.get_by_extension("cpp").unwrap().language_id(),
            "cpp"
        );
        assert_eq!(
            registry.get_by_extension("py").unwrap().language_id(),
            "python"
        );
        assert_eq!(
            registry.get_by_extension("ts").unwrap().language_id(),
            "typescript"
        );
    }

    #[test]
    fn test_registry_extension_case_insensitive() {
        let registry = ExtractorRegistry::new();
        assert!(registry.get_by_extension("CPP").is_some());
    }

    #[test]
    fn test_registry_for_file() {
        let registry = ExtractorRegistry::new();

        assert!(registry.is_analyzable(Path::new("src/main.cpp")));
        assert!(registry.is_analyzable(Path::new("app/main.py")));
        assert!(registry.is_analyzable(Path::new("web/index.ts")));
        assert!(!registry.is_analyzable(Path::new("notes.md")));
        assert!(!registry.is_analyzable(Path::new("Makefile")));
    }

    #[test]
    fn test_factory_name_patterns() {
        assert!(is_factory_name("createGenerator"));
        assert!(is_factory_name("create_generator"));
        assert!(is_factory_name("makeWidget"));
        assert!(is_factory_name("build_pipeline"));
        assert!(is_factory_name("WidgetFactory"));
        assert!(is_factory_name("widget_factory"));

        assert!(!is_factory_name("creator"));
        assert!(!is_factory_name("created"));
        assert!(!is_factory_name("factoryReset"));
        assert!(!is_factory_name("compute"));
    }
}
