//! Python composition-root extractor.
//!
//! Handles named entry functions, `composition_root`-decorated functions,
//! docstring markers, and the `if __name__ == "__main__"` guard block
//! (surfaced as the pseudo-root `__main__`).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use tree_sitter::Node;

use crate::model::{
    CompositionRoot, CreationPattern, InstanceInfo, LifecycleCall, LifecycleMethod, WiringInfo,
};
use crate::syntax::{self, SyntaxModel};

use super::cpp::{read_source, resolve_path};
use super::{is_factory_name, CompositionExtractor, ROOT_MARKER};

pub const MAIN_GUARD: &str = "__main__";

static WIRING_METHODS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "set_next",
        "setNext",
        "connect",
        "add_listener",
        "addListener",
        "add_observer",
        "addObserver",
        "subscribe",
        "link",
        "pipe",
        "chain",
        "attach",
        "register",
        "add",
        "append",
    ])
});

static LIFECYCLE_METHODS: Lazy<HashMap<&'static str, LifecycleMethod>> = Lazy::new(|| {
    HashMap::from([
        ("start", LifecycleMethod::Start),
        ("stop", LifecycleMethod::Stop),
        ("init", LifecycleMethod::Init),
        ("initialize", LifecycleMethod::Init),
        ("shutdown", LifecycleMethod::Shutdown),
        ("connect", LifecycleMethod::Connect),
        ("disconnect", LifecycleMethod::Disconnect),
        ("run", LifecycleMethod::Start),
        ("close", LifecycleMethod::Shutdown),
    ])
});

static ROOT_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "main",
        "create_app",
        "create_pipeline",
        "setup",
        "configure",
        "bootstrap",
    ])
});

pub struct PythonExtractor {
    syntax: SyntaxModel,
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self {
            syntax: SyntaxModel::new(tree_sitter_python::LANGUAGE.into()),
        }
    }

    fn function_name(&self, node: Node, source: &str) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| syntax::node_text(&n, source).to_string())
    }

    fn is_composition_root(&self, name: &str, node: Node, source: &str) -> bool {
        if ROOT_FUNCTIONS.contains(name) {
            return true;
        }
        if self.decorators(node, source).iter().any(|d| d == "composition_root") {
            return true;
        }
        self.docstring(node, source)
            .is_some_and(|doc| doc.contains(ROOT_MARKER))
    }

    fn decorators(&self, node: Node, source: &str) -> Vec<String> {
        let Some(parent) = node.parent().filter(|p| p.kind() == "decorated_definition") else {
            return Vec::new();
        };

        let mut decorators = Vec::new();
        for i in 0..parent.child_count() {
            if let Some(child) = parent.child(i as u32) {
                if child.kind() == "decorator" {
                    let text = syntax::node_text(&child, source);
                    let name = text
                        .trim_start_matches('@')
                        .split('(')
                        .next()
                        .unwrap_or("")
                        .trim();
                    decorators.push(name.to_string());
                }
            }
        }
        decorators
    }

    fn docstring(&self, node: Node, source: &str) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = syntax::child_of_kind(first, "string")?;
        Some(syntax::node_text(&string, source).to_string())
    }

    fn find_main_guard<'t>(&self, root: Node<'t>, source: &str) -> Option<Node<'t>> {
        syntax::walk(root).find(|node| {
            node.kind() == "if_statement"
                && node.child_by_field_name("condition").is_some_and(|cond| {
                    let text = syntax::node_text(&cond, source);
                    text.contains("__name__") && text.contains(MAIN_GUARD)
                })
        })
    }

    fn find_function<'t>(&self, root: Node<'t>, name: &str, source: &str) -> Option<Node<'t>> {
        syntax::walk(root).find(|node| {
            node.kind() == "function_definition"
                && self.function_name(*node, source).as_deref() == Some(name)
        })
    }

    fn extract_body(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        self.extract_instances(body, path, root, source);
        self.extract_wiring(body, path, root, source);
        self.extract_lifecycle(body, path, root, source);
    }

    fn extract_instances(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        for node in syntax::walk(body) {
            if node.kind() == "assignment" {
                if let Some(instance) = self.parse_assignment(node, path, source) {
                    root.instances.push(instance);
                }
            }
        }
    }

    fn parse_assignment(&self, node: Node, path: &Path, source: &str) -> Option<InstanceInfo> {
        let left = node.child_by_field_name("left")?;
        if left.kind() != "identifier" {
            return None;
        }
        let right = node.child_by_field_name("right")?;
        if right.kind() != "call" {
            return None;
        }

        let function = right.child_by_field_name("function")?;
        let func_text = syntax::node_text(&function, source);
        // mod.ClassName -> ClassName for pattern checks
        let simple = func_text.rsplit('.').next().unwrap_or(func_text);
        let name = syntax::node_text(&left, source);
        let location = syntax::node_location(&node, path);
        let args = self.parse_args(right, source);

        if simple.chars().next().is_some_and(|c| c.is_uppercase()) {
            return Some(
                InstanceInfo::new(name, "object", location, CreationPattern::Direct)
                    .with_actual_type(simple)
                    .with_args(args),
            );
        }
        if is_factory_name(simple) {
            return Some(
                InstanceInfo::new(name, "object", location, CreationPattern::Factory)
                    .with_factory(simple)
                    .with_args(args),
            );
        }
        None
    }

    fn parse_args(&self, call: Node, source: &str) -> Vec<String> {
        let Some(args) = call.child_by_field_name("arguments") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for i in 0..args.child_count() {
            if let Some(child) = args.child(i as u32) {
                if !matches!(child.kind(), "(" | ")" | "," | "comment") {
                    out.push(syntax::node_text(&child, source).to_string());
                }
            }
        }
        out
    }

    /// Match `receiver.method(...)` where the receiver is a declared
    /// instance.
    fn member_call<'t>(
        &self,
        stmt: Node<'t>,
        names: &HashSet<String>,
        source: &str,
    ) -> Option<(String, String, Node<'t>)> {
        let call = syntax::child_of_kind(stmt, "call")?;
        let function = call.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            return None;
        }

        let object = function.child_by_field_name("object")?;
        if object.kind() != "identifier" {
            return None;
        }
        let receiver = syntax::node_text(&object, source);
        if !names.contains(receiver) {
            return None;
        }

        let method = function.child_by_field_name("attribute")?;
        Some((
            receiver.to_string(),
            syntax::node_text(&method, source).to_string(),
            call,
        ))
    }

    fn extract_wiring(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        let names: HashSet<String> = root.instances.iter().map(|i| i.name.clone()).collect();

        for node in syntax::walk(body) {
            if node.kind() != "expression_statement" {
                continue;
            }
            let Some((receiver, method, call)) = self.member_call(node, &names, source) else {
                continue;
            };
            if !WIRING_METHODS.contains(method.as_str()) {
                continue;
            }
            let Some(target) = self.resolve_target(call, &names, source) else {
                continue;
            };
            root.wiring.push(WiringInfo::new(
                receiver,
                target,
                method,
                syntax::node_location(&node, path),
            ));
        }
    }

    fn resolve_target(&self, call: Node, names: &HashSet<String>, source: &str) -> Option<String> {
        let args = call.child_by_field_name("arguments")?;
        for i in 0..args.child_count() {
            if let Some(arg) = args.child(i as u32) {
                if arg.kind() == "identifier" {
                    let text = syntax::node_text(&arg, source);
                    if names.contains(text) {
                        return Some(text.to_string());
                    }
                }
            }
        }
        None
    }

    fn extract_lifecycle(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        let names: HashSet<String> = root.instances.iter().map(|i| i.name.clone()).collect();

        for node in syntax::walk(body) {
            if node.kind() != "expression_statement" {
                continue;
            }
            let Some((receiver, method, _)) = self.member_call(node, &names, source) else {
                continue;
            };
            let Some(lifecycle) = LIFECYCLE_METHODS.get(method.as_str()) else {
                continue;
            };
            let order = root.lifecycle.len() as u32;
            root.lifecycle.push(LifecycleCall {
                instance: receiver,
                method: *lifecycle,
                location: syntax::node_location(&node, path),
                order,
            });
        }
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionExtractor for PythonExtractor {
    fn language_id(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["py"]
    }

    fn is_available(&self) -> bool {
        self.syntax.is_available()
    }

    fn find_composition_roots(&self, path: &Path) -> Vec<String> {
        let Some(source) = read_source(path) else {
            return Vec::new();
        };
        let Some(tree) = self.syntax.parse(&source) else {
            return Vec::new();
        };

        let mut roots = Vec::new();
        for node in syntax::walk(tree.root_node()) {
            if node.kind() == "function_definition" {
                if let Some(name) = self.function_name(node, &source) {
                    if self.is_composition_root(&name, node, &source) {
                        roots.push(name);
                    }
                }
            }
        }

        if self.find_main_guard(tree.root_node(), &source).is_some() {
            roots.push(MAIN_GUARD.to_string());
        }
        roots
    }

    fn extract(&self, path: &Path, function_name: Option<&str>) -> Option<CompositionRoot> {
        let source = read_source(path)?;
        let tree = self.syntax.parse(&source)?;
        let file_path = resolve_path(path);
        let target = function_name.unwrap_or("main");

        if target == MAIN_GUARD {
            let guard = self.find_main_guard(tree.root_node(), &source)?;
            let location = syntax::node_location(&guard, &file_path);
            let mut root = CompositionRoot::new(&file_path, MAIN_GUARD, location);
            if let Some(body) = guard.child_by_field_name("consequence") {
                self.extract_body(body, &file_path, &mut root, &source);
            }
            return Some(root);
        }

        let func = self.find_function(tree.root_node(), target, &source)?;
        let location = syntax::node_location(&func, &file_path);
        let mut root = CompositionRoot::new(&file_path, target, location);
        if let Some(body) = func.child_by_field_name("body") {
            self.extract_body(body, &file_path, &mut root, &source);
        }
        Some(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MAIN_PY: &str = r#"
def main():
    gen = create_generator()
    filt = FilterModule(threshold=3)
    printer = make_printer()
    count = 10

    gen.set_next(filt)
    filt.pipe(printer)

    printer.start()
    filt.start()
    gen.start()

    gen.stop()
    filt.stop()
    printer.stop()
"#;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_find_composition_roots_by_name() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "app.py",
            "def create_app():\n    pass\n\ndef helper():\n    pass\n",
        );

        let roots = PythonExtractor::new().find_composition_roots(&path);
        assert_eq!(roots, vec!["create_app"]);
    }

    #[test]
    fn test_find_composition_roots_decorator() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "wiring.py",
            "@composition_root\ndef wire_modules():\n    pass\n",
        );

        let roots = PythonExtractor::new().find_composition_roots(&path);
        assert_eq!(roots, vec!["wire_modules"]);
    }

    #[test]
    fn test_find_composition_roots_docstring_marker() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "wiring.py",
            "def assemble():\n    \"\"\"Assemble the pipeline.\n\n    @composition-root\n    \"\"\"\n    pass\n",
        );

        let roots = PythonExtractor::new().find_composition_roots(&path);
        assert_eq!(roots, vec!["assemble"]);
    }

    #[test]
    fn test_find_composition_roots_main_guard() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "script.py",
            "gen = create_generator()\n\nif __name__ == \"__main__\":\n    gen.start()\n",
        );

        let roots = PythonExtractor::new().find_composition_roots(&path);
        assert!(roots.contains(&MAIN_GUARD.to_string()));
    }

    #[test]
    fn test_extract_instances_skips_literals_and_plain_calls() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "main.py",
            "def main():\n    gen = create_generator()\n    count = 10\n    name = \"pipeline\"\n    result = compute()\n",
        );

        let root = PythonExtractor::new().extract(&path, None).unwrap();
        assert_eq!(root.instances.len(), 1);
        assert_eq!(root.instances[0].name, "gen");
    }

    #[test]
    fn test_extract_direct_and_factory() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "main.py", MAIN_PY);

        let root = PythonExtractor::new().extract(&path, None).unwrap();
        assert_eq!(root.instances.len(), 3);

        let gen = &root.instances[0];
        assert_eq!(gen.creation_pattern, CreationPattern::Factory);
        assert_eq!(gen.factory_name.as_deref(), Some("create_generator"));

        let filt = &root.instances[1];
        assert_eq!(filt.creation_pattern, CreationPattern::Direct);
        assert_eq!(filt.actual_type.as_deref(), Some("FilterModule"));
        assert_eq!(filt.constructor_args, vec!["threshold=3"]);
    }

    #[test]
    fn test_extract_wiring() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "main.py", MAIN_PY);

        let root = PythonExtractor::new().extract(&path, None).unwrap();
        assert_eq!(root.wiring.len(), 2);
        assert_eq!(root.wiring[0].source, "gen");
        assert_eq!(root.wiring[0].target, "filt");
        assert_eq!(root.wiring[0].method, "set_next");
        assert_eq!(root.wiring[1].method, "pipe");
    }

    #[test]
    fn test_extract_lifecycle_interleaving() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "main.py", MAIN_PY);

        let root = PythonExtractor::new().extract(&path, None).unwrap();
        assert_eq!(root.lifecycle.len(), 6);

        let starts: Vec<&str> = root
            .lifecycle
            .iter()
            .filter(|c| c.method == LifecycleMethod::Start)
            .map(|c| c.instance.as_str())
            .collect();
        assert_eq!(starts, vec!["printer", "filt", "gen"]);

        let stops: Vec<&str> = root
            .lifecycle
            .iter()
            .filter(|c| c.method == LifecycleMethod::Stop)
            .map(|c| c.instance.as_str())
            .collect();
        assert_eq!(stops, vec!["gen", "filt", "printer"]);
    }

    #[test]
    fn test_extract_from_main_guard() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "script.py",
            r#"
if __name__ == "__main__":
    gen = create_generator()
    sink = create_sink()
    gen.pipe(sink)
    gen.start()
"#,
        );

        let root = PythonExtractor::new().extract(&path, Some(MAIN_GUARD)).unwrap();
        assert_eq!(root.function_name, MAIN_GUARD);
        assert_eq!(root.instances.len(), 2);
        assert_eq!(root.wiring.len(), 1);
        assert_eq!(root.lifecycle.len(), 1);
    }

    #[test]
    fn test_extract_missing_function_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "main.py", MAIN_PY);

        assert!(PythonExtractor::new()
            .extract(&path, Some("bootstrap"))
            .is_none());
    }

    #[test]
    fn test_wiring_target_must_be_declared() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "main.py",
            "def main(sink):\n    gen = create_generator()\n    gen.connect(sink)\n",
        );

        let root = PythonExtractor::new().extract(&path, None).unwrap();
        // sink is a parameter, not a declared instance
        assert!(root.wiring.is_empty());
    }
}
