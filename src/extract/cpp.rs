//! C++ composition-root extractor.
//!
//! Recognizes `main()` (or marker-annotated functions), smart-pointer and
//! factory instance declarations, member-call wiring, and lifecycle calls.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use tracing::debug;
use tree_sitter::Node;

use crate::model::{
    CompositionRoot, CreationPattern, InstanceInfo, LifecycleCall, LifecycleMethod, WiringInfo,
};
use crate::syntax::{self, SyntaxModel};

use super::{is_factory_name, CompositionExtractor, ROOT_MARKER};

static WIRING_METHODS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "setNext",
        "set_next",
        "connect",
        "addListener",
        "add_listener",
        "addObserver",
        "add_observer",
        "subscribe",
        "link",
        "pipe",
        "chain",
        "attach",
        "register",
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
    ])
});

/// Declaration type nodes whose text is kept as the declared type.
const TYPE_KINDS: &[&str] = &[
    "type_identifier",
    "primitive_type",
    "auto",
    "placeholder_type_specifier",
    "template_type",
    "qualified_identifier",
];

struct InitInfo {
    pattern: CreationPattern,
    factory_name: Option<String>,
    actual_type: Option<String>,
    args: Vec<String>,
    is_pointer: bool,
    pointer_type: Option<String>,
}

pub struct CppExtractor {
    syntax: SyntaxModel,
}

impl CppExtractor {
    pub fn new() -> Self {
        Self {
            syntax: SyntaxModel::new(tree_sitter_cpp::LANGUAGE.into()),
        }
    }

    fn find_function<'t>(&self, root: Node<'t>, name: &str, source: &str) -> Option<Node<'t>> {
        syntax::walk(root).find(|node| {
            node.kind() == "function_definition"
                && self.function_name(*node, source).as_deref() == Some(name)
        })
    }

    fn function_name(&self, node: Node, source: &str) -> Option<String> {
        let mut declarator = node.child_by_field_name("declarator")?;
        if declarator.kind() == "pointer_declarator" {
            declarator = syntax::child_of_kind(declarator, "function_declarator")?;
        }
        if declarator.kind() != "function_declarator" {
            return None;
        }

        let name_node = declarator.child_by_field_name("declarator")?;
        match name_node.kind() {
            "identifier" => Some(syntax::node_text(&name_node, source).to_string()),
            "qualified_identifier" => name_node
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier")
                .map(|n| syntax::node_text(&n, source).to_string()),
            _ => None,
        }
    }

    fn is_composition_root(&self, name: &str, node: Node, source: &str) -> bool {
        if name == "main" {
            return true;
        }
        self.marker_precedes(node, source)
    }

    /// Scan up to ten comment lines above the function for the root marker,
    /// stopping at the first non-comment non-empty line.
    fn marker_precedes(&self, node: Node, source: &str) -> bool {
        let lines: Vec<&str> = source.lines().collect();
        let start = node.start_position().row;

        for offset in 1..=10 {
            if offset > start {
                break;
            }
            let line = lines[start - offset].trim();
            if line.contains(ROOT_MARKER) {
                return true;
            }
            if !line.is_empty()
                && !line.starts_with("//")
                && !line.starts_with("/*")
                && !line.starts_with('*')
            {
                break;
            }
        }
        false
    }

    fn extract_instances(
        &self,
        body: Node,
        path: &Path,
        root: &mut CompositionRoot,
        source: &str,
    ) {
        for node in syntax::walk(body) {
            if node.kind() == "declaration" {
                if let Some(instance) = self.parse_declaration(node, path, source) {
                    root.instances.push(instance);
                }
            }
        }
    }

    fn parse_declaration(&self, node: Node, path: &Path, source: &str) -> Option<InstanceInfo> {
        let declarator = syntax::child_of_kind(node, "init_declarator")?;

        let declared_type = node
            .child_by_field_name("type")
            .filter(|t| TYPE_KINDS.contains(&t.kind()))
            .map(|t| syntax::node_text(&t, source).to_string())
            .unwrap_or_else(|| "auto".to_string());

        let name_node = declarator.child_by_field_name("declarator")?;
        let name = match name_node.kind() {
            "identifier" => syntax::node_text(&name_node, source).to_string(),
            // auto* name = ...
            "pointer_declarator" => {
                let inner = syntax::descendant_of_kind(name_node, "identifier")?;
                syntax::node_text(&inner, source).to_string()
            }
            _ => return None,
        };

        let value = declarator.child_by_field_name("value")?;
        if value.kind() != "call_expression" {
            return None;
        }
        let init = self.parse_initializer(value, source)?;

        let mut instance = InstanceInfo::new(
            name,
            declared_type,
            syntax::node_location(&node, path),
            init.pattern,
        )
        .with_args(init.args);
        if let Some(actual) = init.actual_type {
            instance = instance.with_actual_type(actual);
        }
        if let Some(factory) = init.factory_name {
            instance = instance.with_factory(factory);
        }
        if init.is_pointer {
            if let Some(pointer) = init.pointer_type {
                instance = instance.with_pointer(pointer);
            }
        }
        Some(instance)
    }

    fn parse_initializer(&self, call: Node, source: &str) -> Option<InitInfo> {
        let function = call.child_by_field_name("function")?;
        let func_text = syntax::node_text(&function, source);
        let args = self.parse_args(call, source);

        if func_text.contains("make_unique") || func_text.contains("make_shared") {
            let unique = func_text.contains("make_unique");
            let actual_type = syntax::descendant_of_kind(function, "template_argument_list")
                .and_then(|tal| syntax::child_of_kind(tal, "type_descriptor"))
                .map(|td| syntax::node_text(&td, source).to_string());
            return Some(InitInfo {
                pattern: if unique {
                    CreationPattern::SmartPointerUnique
                } else {
                    CreationPattern::SmartPointerShared
                },
                factory_name: None,
                actual_type,
                args,
                is_pointer: true,
                pointer_type: Some(if unique { "unique_ptr" } else { "shared_ptr" }.to_string()),
            });
        }

        // std::foo::createBar -> createBar for pattern checks
        let simple = func_text.rsplit("::").next().unwrap_or(func_text);

        if is_factory_name(simple) {
            // factories conventionally hand back owning pointers
            return Some(InitInfo {
                pattern: CreationPattern::Factory,
                factory_name: Some(simple.to_string()),
                actual_type: None,
                args,
                is_pointer: true,
                pointer_type: Some("unique_ptr".to_string()),
            });
        }

        if simple.chars().next().is_some_and(|c| c.is_uppercase()) {
            return Some(InitInfo {
                pattern: CreationPattern::Direct,
                factory_name: None,
                actual_type: Some(simple.to_string()),
                args,
                is_pointer: false,
                pointer_type: None,
            });
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

    fn extract_wiring(&self, body: Node, path: &Path, root: &mut CompositionRoot, source: &str) {
        let names: HashSet<String> = root.instances.iter().map(|i| i.name.clone()).collect();

        for node in syntax::walk(body) {
            if node.kind() == "expression_statement" {
                if let Some(wiring) = self.parse_wiring_call(node, path, &names, source) {
                    root.wiring.push(wiring);
                }
            }
        }
    }

    fn parse_wiring_call(
        &self,
        stmt: Node,
        path: &Path,
        names: &HashSet<String>,
        source: &str,
    ) -> Option<WiringInfo> {
        let (receiver, method, call) = self.member_call(stmt, names, source)?;
        if !WIRING_METHODS.contains(method.as_str()) {
            return None;
        }

        let args = call.child_by_field_name("arguments")?;
        let target = self.resolve_target(args, names, source)?;

        Some(WiringInfo::new(
            receiver,
            target,
            method,
            syntax::node_location(&stmt, path),
        ))
    }

    /// Match `receiver.method(...)` / `receiver->method(...)` where the
    /// receiver is a declared instance.
    fn member_call<'t>(
        &self,
        stmt: Node<'t>,
        names: &HashSet<String>,
        source: &str,
    ) -> Option<(String, String, Node<'t>)> {
        let call = syntax::child_of_kind(stmt, "call_expression")?;
        let function = call.child_by_field_name("function")?;
        if function.kind() != "field_expression" {
            return None;
        }

        let receiver = function.child_by_field_name("argument")?;
        if receiver.kind() != "identifier" {
            return None;
        }
        let receiver_name = syntax::node_text(&receiver, source);
        if !names.contains(receiver_name) {
            return None;
        }

        let method = function.child_by_field_name("field")?;
        Some((
            receiver_name.to_string(),
            syntax::node_text(&method, source).to_string(),
            call,
        ))
    }

    /// First argument resolving to a declared instance, unwrapping one
    /// level of accessor call (`x.get()`) or address-of/deref.
    fn resolve_target(
        &self,
        args: Node,
        names: &HashSet<String>,
        source: &str,
    ) -> Option<String> {
        for i in 0..args.child_count() {
            let Some(arg) = args.child(i as u32) else { continue };
            match arg.kind() {
                "identifier" => {
                    let text = syntax::node_text(&arg, source);
                    if names.contains(text) {
                        return Some(text.to_string());
                    }
                }
                "call_expression" => {
                    if let Some(inner) = arg
                        .child_by_field_name("function")
                        .filter(|f| f.kind() == "field_expression")
                        .and_then(|f| f.child_by_field_name("argument"))
                        .filter(|r| r.kind() == "identifier")
                    {
                        let text = syntax::node_text(&inner, source);
                        if names.contains(text) {
                            return Some(text.to_string());
                        }
                    }
                }
                "pointer_expression" => {
                    if let Some(inner) = syntax::descendant_of_kind(arg, "identifier") {
                        let text = syntax::node_text(&inner, source);
                        if names.contains(text) {
                            return Some(text.to_string());
                        }
                    }
                }
                _ => {}
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

impl Default for CppExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionExtractor for CppExtractor {
    fn language_id(&self) -> &'static str {
        "cpp"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["cpp", "cc", "cxx", "hpp", "h", "hxx"]
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
        roots
    }

    fn extract(&self, path: &Path, function_name: Option<&str>) -> Option<CompositionRoot> {
        let source = read_source(path)?;
        let tree = self.syntax.parse(&source)?;
        let file_path = resolve_path(path);
        let target = function_name.unwrap_or("main");

        let func = self.find_function(tree.root_node(), target, &source)?;
        let location = syntax::node_location(&func, &file_path);
        let mut root = CompositionRoot::new(&file_path, target, location);

        let Some(body) = func.child_by_field_name("body") else {
            return Some(root);
        };
        self.extract_instances(body, &file_path, &mut root, &source);
        self.extract_wiring(body, &file_path, &mut root, &source);
        self.extract_lifecycle(body, &file_path, &mut root, &source);

        Some(root)
    }
}

pub(crate) fn read_source(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "failed to read source");
            None
        }
    }
}

pub(crate) fn resolve_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
