//! TypeScript/JavaScript composition-root extractor.
//!
//! Recognizes named entry functions (declarations and arrow-function
//! bindings), marker comments, and conventional entry files whose top level
//! does real work (surfaced as the pseudo-root `__module__`).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::model::{
    CompositionRoot, CreationPattern, InstanceInfo, LifecycleCall, LifecycleMethod, Location,
    WiringInfo,
};
use crate::syntax::{self, SyntaxModel};

use super::cpp::{read_source, resolve_path};
use super::{is_factory_name, CompositionExtractor, ROOT_MARKER};

pub const MODULE_ROOT: &str = "__module__";

static WIRING_METHODS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "setNext",
        "set_next",
        "connect",
        "addListener",
        "addEventListener",
        "addObserver",
        "subscribe",
        "link",
        "pipe",
        "chain",
        "attach",
        "register",
        "add",
        "push",
        "on",
        "use",
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
        ("dispose", LifecycleMethod::Shutdown),
        ("destroy", LifecycleMethod::Shutdown),
    ])
});

static ROOT_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "main",
        "createApp",
        "createPipeline",
        "setup",
        "configure",
        "bootstrap",
        "init",
        "initialize",
    ])
});

static ENTRY_FILES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "index.ts", "index.js", "main.ts", "main.js", "app.ts", "app.js",
    ])
});

static METHOD_FACTORY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.create$").unwrap());

const FUNCTION_VALUE_KINDS: &[&str] = &["arrow_function", "function_expression", "function"];

pub struct TypeScriptExtractor {
    syntax: SyntaxModel,
}

impl TypeScriptExtractor {
    pub fn new() -> Self {
        Self {
            syntax: SyntaxModel::new(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        }
    }

    fn declarator_name(&self, node: Node, source: &str) -> Option<String> {
        node.child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
            .map(|n| syntax::node_text(&n, source).to_string())
    }

    fn is_function_binding(&self, declarator: Node) -> bool {
        declarator
            .child_by_field_name("value")
            .is_some_and(|v| FUNCTION_VALUE_KINDS.contains(&v.kind()))
    }

    fn is_composition_root(&self, name: &str, node: Node, source: &str) -> bool {
        if ROOT_FUNCTIONS.contains(name) {
            return true;
        }
        self.marker_precedes(node, source)
    }

    /// True when a comment containing the root marker immediately precedes
    /// the statement holding this node.
    fn marker_precedes(&self, node: Node, source: &str) -> bool {
        let mut statement = node;
        while let Some(parent) = statement.parent() {
            if parent.kind() == "program" {
                break;
            }
            statement = parent;
        }
        statement
            .prev_sibling()
            .filter(|p| p.kind() == "comment")
            .is_some_and(|c| syntax::node_text(&c, source).contains(ROOT_MARKER))
    }

    /// Meaningful top-level statements, beyond imports/exports/comments.
    fn has_top_level_code(&self, root: Node) -> bool {
        for i in 0..root.child_count() {
            let Some(child) = root.child(i as u32) else { continue };
            match child.kind() {
                "import_statement" | "export_statement" | "comment" => continue,
                "expression_statement" => return true,
                "lexical_declaration" | "variable_declaration" => {
                    if syntax::walk(child)
                        .any(|n| matches!(n.kind(), "new_expression" | "call_expression"))
                    {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn find_function<'t>(&self, root: Node<'t>, name: &str, source: &str) -> Option<Node<'t>> {
        syntax::walk(root).find(|node| match node.kind() {
            "function_declaration" => node
                .child_by_field_name("name")
                .map(|n| syntax::node_text(&n, source) == name)
                .unwrap_or(false),
            "variable_declarator" => {
                self.declarator_name(*node, source).as_deref() == Some(name)
                    && self.is_function_binding(*node)
            }
            _ => false,
        })
    }

    fn extract_body(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        self.extract_instances(body, path, root, source);
        self.extract_wiring(body, path, root, source);
        self.extract_lifecycle(body, path, root, source);
    }

    fn extract_instances(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        for node in syntax::walk(body) {
            if matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
                for i in 0..node.child_count() {
                    if let Some(declarator) = node.child(i as u32) {
                        if declarator.kind() == "variable_declarator" {
                            if let Some(instance) =
                                self.parse_declarator(declarator, path, source)
                            {
                                root.instances.push(instance);
                            }
                        }
                    }
                }
            }
        }
    }

    fn parse_declarator(&self, node: Node, path: &Path, source: &str) -> Option<InstanceInfo> {
        let name = self.declarator_name(node, source)?;
        let value = node.child_by_field_name("value")?;
        let location = syntax::node_location(&node, path);

        match value.kind() {
            "new_expression" => {
                let constructor = value.child_by_field_name("constructor")?;
                let text = syntax::node_text(&constructor, source);
                let class_name = text.rsplit('.').next().unwrap_or(text);
                let args = self.parse_args(value, source);
                Some(
                    InstanceInfo::new(name, "object", location, CreationPattern::Direct)
                        .with_actual_type(class_name)
                        .with_args(args),
                )
            }
            "call_expression" => {
                let function = value.child_by_field_name("function")?;
                let func_text = syntax::node_text(&function, source);
                let args = self.parse_args(value, source);

                if METHOD_FACTORY.is_match(func_text) {
                    return Some(
                        InstanceInfo::new(name, "object", location, CreationPattern::Factory)
                            .with_factory(func_text)
                            .with_args(args),
                    );
                }

                let simple = func_text.rsplit('.').next().unwrap_or(func_text);
                if is_factory_name(simple) {
                    return Some(
                        InstanceInfo::new(name, "object", location, CreationPattern::Factory)
                            .with_factory(simple)
                            .with_args(args),
                    );
                }
                if simple.chars().next().is_some_and(|c| c.is_uppercase()) {
                    return Some(
                        InstanceInfo::new(name, "object", location, CreationPattern::Direct)
                            .with_actual_type(simple)
                            .with_args(args),
                    );
                }
                None
            }
            _ => None,
        }
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
    /// instance, looking through wrappers like `await`.
    fn member_call<'t>(
        &self,
        stmt: Node<'t>,
        names: &HashSet<String>,
        source: &str,
    ) -> Option<(String, String, Node<'t>)> {
        let call = syntax::walk(stmt).find(|n| n.kind() == "call_expression")?;
        let function = call.child_by_field_name("function")?;
        if function.kind() != "member_expression" {
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

        let property = function.child_by_field_name("property")?;
        Some((
            receiver.to_string(),
            syntax::node_text(&property, source).to_string(),
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

impl Default for TypeScriptExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionExtractor for TypeScriptExtractor {
    fn language_id(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "mts"]
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
            match node.kind() {
                "function_declaration" => {
                    if let Some(name) = node
                        .child_by_field_name("name")
                        .map(|n| syntax::node_text(&n, &source).to_string())
                    {
                        if self.is_composition_root(&name, node, &source) {
                            roots.push(name);
                        }
                    }
                }
                "variable_declarator" => {
                    if self.is_function_binding(node) {
                        if let Some(name) = self.declarator_name(node, &source) {
                            if self.is_composition_root(&name, node, &source) {
                                roots.push(name);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let is_entry_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| ENTRY_FILES.contains(n));
        if is_entry_file && self.has_top_level_code(tree.root_node()) {
            roots.push(MODULE_ROOT.to_string());
        }
        roots
    }

    fn extract(&self, path: &Path, function_name: Option<&str>) -> Option<CompositionRoot> {
        let source = read_source(path)?;
        let tree = self.syntax.parse(&source)?;
        let file_path = resolve_path(path);
        let target = function_name.unwrap_or("main");

        if target == MODULE_ROOT {
            let mut root = CompositionRoot::new(
                &file_path,
                MODULE_ROOT,
                Location::new(&file_path, 1, 0),
            );
            self.extract_body(tree.root_node(), &file_path, &mut root, &source);
            return Some(root);
        }

        let func = self.find_function(tree.root_node(), target, &source)?;
        let location = syntax::node_location(&func, &file_path);
        let mut root = CompositionRoot::new(&file_path, target, location);

        let body = syntax::descendant_of_kind(func, "statement_block").unwrap_or(func);
        self.extract_body(body, &file_path, &mut root, &source);
        Some(root)
    }
}
