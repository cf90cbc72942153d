// model.rs
// Shared data model: components, call edges, repository identity, module tree

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stable identifier for an extracted component.
///
/// Top-level elements use `<dotted_module_path>.<name>`, class members use
/// `<dotted_module_path>.<class>.<method>`, where the dotted module path is
/// the file path relative to the repository root with the extension stripped
/// and separators mapped to `.`.
pub type ComponentId = String;

/// Registry of every component extracted in a run, keyed by id.
///
/// A `BTreeMap` keeps iteration and serialization order deterministic so two
/// runs over an unchanged repository produce byte-identical artifacts.
pub type ComponentRegistry = BTreeMap<ComponentId, Component>;

/// Dependency adjacency: `A -> {B, ...}` means A depends on B.
pub type DependencyGraph = BTreeMap<ComponentId, BTreeSet<ComponentId>>;

/// Kind of an extracted code element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Class,
    Interface,
    Struct,
    Enum,
    Record,
    Annotation,
    Trait,
    Function,
    Method,
    Variable,
    TypeAlias,
    VueComponent,
    VueProps,
    VueEmits,
    /// Kinds this version does not know about are carried verbatim so a
    /// newer artifact never fails to load.
    #[serde(untagged)]
    Other(String),
}

impl ComponentKind {
    /// True for class-like kinds that anchor methods and inheritance.
    pub fn is_class_like(&self) -> bool {
        matches!(
            self,
            ComponentKind::Class
                | ComponentKind::Interface
                | ComponentKind::Struct
                | ComponentKind::Trait
        )
    }
}

/// A single extracted code element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub kind: ComponentKind,
    pub file_path: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    #[serde(default)]
    pub has_doc: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docstring: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_class: Option<String>,
    /// Intra-repository dependencies by component id. Populated by the graph
    /// builder from resolved call edges; extraction leaves it empty.
    #[serde(default)]
    pub depends_on: BTreeSet<ComponentId>,
    /// Free-form language-specific annotations (e.g. Vue reactivity flavor).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Component {
    /// Human-facing label: `kind name`, with the enclosing class if any.
    pub fn display_name(&self) -> String {
        let kind = match &self.kind {
            ComponentKind::Other(s) => s.clone(),
            k => serde_json::to_value(k)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        };
        match &self.enclosing_class {
            Some(class) => format!("{} {}.{}", kind, class, self.name),
            None => format!("{} {}", kind, self.name),
        }
    }
}

/// Kind of relationship carried by a [`CallEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    UsesComponent,
    References,
    Extends,
    Implements,
    Imports,
}

/// A typed relationship between two components.
///
/// `callee` starts out as the textual target seen at the call site; the graph
/// builder rewrites it to a registry id when resolution succeeds and flips
/// `resolved`. Unresolved edges are retained for diagnostics only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: ComponentId,
    pub callee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub kind: EdgeKind,
    #[serde(default)]
    pub resolved: bool,
}

impl CallEdge {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            caller: caller.into(),
            callee: callee.into(),
            line: None,
            kind,
            resolved: false,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Repository identity for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    pub name: String,
    pub root: String,
    pub analysis_id: String,
}

/// A node in the hierarchical module partition tree.
///
/// A node is a leaf module iff `children` is empty. Every component id in the
/// tree belongs to exactly one node's `components`, and the union across the
/// tree equals the graph builder's filtered leaf set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleNode {
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentId>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, ModuleNode>,
}

impl ModuleNode {
    pub fn leaf(name: impl Into<String>, components: Vec<ComponentId>) -> Self {
        Self {
            name: name.into(),
            components,
            children: IndexMap::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Locate a node by its path of child names from this node.
    pub fn descend(&self, path: &[String]) -> Option<&ModuleNode> {
        let mut node = self;
        for part in path {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    /// All component ids mentioned anywhere in this subtree.
    pub fn all_component_ids(&self) -> Vec<ComponentId> {
        let mut out = self.components.clone();
        for child in self.children.values() {
            out.extend(child.all_component_ids());
        }
        out
    }

    /// Post-order traversal paths: every child path before its parent, root
    /// (empty path) last. This is the documentation processing order.
    pub fn post_order_paths(&self) -> Vec<Vec<String>> {
        fn walk(node: &ModuleNode, prefix: &[String], out: &mut Vec<Vec<String>>) {
            for (name, child) in &node.children {
                let mut path = prefix.to_vec();
                path.push(name.clone());
                walk(child, &path, out);
                out.push(path);
            }
        }
        let mut out = Vec::new();
        walk(self, &[], &mut out);
        out.push(Vec::new());
        out
    }

    /// Number of distinct source files the node's components live in.
    pub fn distinct_files(&self, registry: &ComponentRegistry) -> usize {
        let files: BTreeSet<&str> = self
            .components
            .iter()
            .filter_map(|id| registry.get(id))
            .map(|c| c.relative_path.as_str())
            .collect();
        files.len()
    }
}
