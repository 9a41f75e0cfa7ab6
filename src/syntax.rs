//! Thin wrapper around tree-sitter.
//!
//! Extractors depend on this module only, never on a grammar crate directly,
//! so swapping the syntax-tree backend touches nothing else.

use std::path::Path;

use once_cell::sync::OnceCell;
use tree_sitter::{Language, Node, Parser, Tree};

use crate::model::Location;

/// Per-language parser handle with cached availability.
pub struct SyntaxModel {
    language: Language,
    available: OnceCell<bool>,
}

impl SyntaxModel {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            available: OnceCell::new(),
        }
    }

    /// True iff the grammar loaded into a parser successfully. Computed once
    /// and cached; a failed probe reports unavailable instead of panicking.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let mut parser = Parser::new();
            parser.set_language(&self.language).is_ok()
        })
    }

    /// Parse source text, returning `None` when the grammar is unavailable
    /// or the parser gives up.
    pub fn parse(&self, source: &str) -> Option<Tree> {
        if !self.is_available() {
            return None;
        }
        let mut parser = Parser::new();
        parser.set_language(&self.language).ok()?;
        parser.parse(source, None)
    }
}

/// Preorder depth-first traversal preserving source order.
pub fn walk(node: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    WalkIter { stack: vec![node] }
}

struct WalkIter<'t> {
    stack: Vec<Node<'t>>,
}

impl<'t> Iterator for WalkIter<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Node<'t>> {
        let node = self.stack.pop()?;
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i as u32) {
                self.stack.push(child);
            }
        }
        Some(node)
    }
}

/// Exact source text of a node.
pub fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Location of a node's start, with a 1-based line.
pub fn node_location(node: &Node, file_path: &Path) -> Location {
    Location::new(
        file_path,
        node.start_position().row as u32 + 1,
        node.start_position().column as u32,
    )
}

/// First direct child of the given kind.
pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i as u32) {
            if child.kind() == kind {
                return Some(child);
            }
        }
    }
    None
}

/// First node of the given kind anywhere in the subtree.
pub fn descendant_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    walk(node).find(|n| n.kind() == kind)
}
