// extract/php.rs
// PHP strategy: classes, traits, interfaces, enums, functions, methods.
// A per-file NamespaceResolver ingests `namespace` and `use` declarations
// (grouped use included) so short names become fully-qualified before edges
// are emitted.

use crate::extract::engine::{clean_callee, doc_comment_above, split_top_level};
use crate::extract::language::{module_path, Language};
use crate::extract::FileInput;
use crate::model::{CallEdge, Component, ComponentKind, EdgeKind};
use std::collections::HashMap;
use tracing::warn;
use tree_sitter::{Node, Parser};

pub fn extract(input: &FileInput) -> (Vec<Component>, Vec<CallEdge>) {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&Language::Php.grammar()) {
        tracing::error!("php parser init failed: {}", e);
        return (Vec::new(), Vec::new());
    }
    let Some(tree) = parser.parse(input.content, None) else {
        warn!("failed to parse {}", input.relative_path);
        return (Vec::new(), Vec::new());
    };

    let mut walker = PhpWalker {
        src: input.content.as_bytes(),
        lines: input.content.lines().collect(),
        module: module_path(input.relative_path),
        file_path: input.file_path.to_string_lossy().to_string(),
        relative_path: input.relative_path.to_string(),
        components: Vec::new(),
        edges: Vec::new(),
        class_stack: Vec::new(),
        resolver: NamespaceResolver::default(),
    };
    walker.scan_namespace(tree.root_node(), 0);
    walker.definitions(tree.root_node(), 0);
    walker.calls(tree.root_node());
    (walker.components, walker.edges)
}

/// Converts short names to fully-qualified names using the file's
/// `namespace` declaration and `use` imports.
#[derive(Debug, Default)]
pub struct NamespaceResolver {
    namespace: String,
    /// alias (short name) -> fully-qualified name
    uses: HashMap<String, String>,
}

impl NamespaceResolver {
    pub fn set_namespace(&mut self, ns: &str) {
        self.namespace = ns.trim_matches('\\').to_string();
    }

    pub fn add_use(&mut self, fqn: &str, alias: Option<&str>) {
        let fqn = fqn.trim_matches('\\').to_string();
        let alias = alias
            .map(str::to_string)
            .unwrap_or_else(|| fqn.rsplit('\\').next().unwrap_or(&fqn).to_string());
        self.uses.insert(alias, fqn);
    }

    /// Qualify a name seen in code. `\Fully\Qualified` names pass through,
    /// imported short names expand via the use map, everything else is
    /// prefixed with the current namespace.
    pub fn qualify(&self, name: &str) -> String {
        if let Some(stripped) = name.strip_prefix('\\') {
            return stripped.to_string();
        }
        let head = name.split('\\').next().unwrap_or(name);
        if let Some(fqn) = self.uses.get(head) {
            if head == name {
                return fqn.clone();
            }
            return format!("{}\\{}", fqn, &name[head.len() + 1..]);
        }
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.namespace, name)
        }
    }
}

struct PhpWalker<'a> {
    src: &'a [u8],
    lines: Vec<&'a str>,
    module: String,
    file_path: String,
    relative_path: String,
    components: Vec<Component>,
    edges: Vec<CallEdge>,
    class_stack: Vec<String>,
    resolver: NamespaceResolver,
}

impl<'a> PhpWalker<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    fn component_id(&self, name: &str) -> String {
        match self.class_stack.last() {
            Some(class) => format!("{}.{}.{}", self.module, class, name),
            None => format!("{}.{}", self.module, name),
        }
    }

    // ── Namespace and use ingestion ──

    fn scan_namespace(&mut self, node: Node, depth: usize) {
        if depth > 100 {
            return;
        }
        match node.kind() {
            "namespace_definition" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let ns = self.text(name);
                    self.resolver.set_namespace(&ns);
                }
            }
            "namespace_use_declaration" => {
                self.ingest_use(node);
            }
            _ => {}
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.scan_namespace(child, depth + 1);
        }
    }

    fn ingest_use(&mut self, node: Node) {
        // Plain: use A\B\C;  use A\B\C as D;
        // Grouped: use A\B\{C, D as E};
        let mut prefix = String::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in &children {
            match child.kind() {
                "namespace_use_clause" => {
                    self.ingest_use_clause(*child, "");
                }
                "namespace_name" | "qualified_name" => {
                    prefix = self.text(*child);
                }
                "namespace_use_group" => {
                    let mut group_cursor = child.walk();
                    let clauses: Vec<Node> = child.children(&mut group_cursor).collect();
                    for clause in clauses {
                        if clause.kind() == "namespace_use_clause"
                            || clause.kind() == "namespace_use_group_clause"
                        {
                            self.ingest_use_clause(clause, &prefix);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn ingest_use_clause(&mut self, clause: Node, prefix: &str) {
        let mut name = None;
        let mut alias = None;
        let mut cursor = clause.walk();
        for part in clause.children(&mut cursor) {
            match part.kind() {
                "qualified_name" | "namespace_name" | "name" => {
                    if name.is_none() {
                        name = Some(self.text(part));
                    } else {
                        alias = Some(self.text(part));
                    }
                }
                "namespace_aliasing_clause" => {
                    let mut alias_cursor = part.walk();
                    for a in part.children(&mut alias_cursor) {
                        if a.kind() == "name" {
                            alias = Some(self.text(a));
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(name) = name {
            let fqn = if prefix.is_empty() {
                name
            } else {
                format!("{}\\{}", prefix.trim_matches('\\'), name)
            };
            self.resolver.add_use(&fqn, alias.as_deref());
        }
    }

    // ── Definitions ──

    fn definitions(&mut self, node: Node, depth: usize) {
        if depth > 100 {
            return;
        }
        let kind = match node.kind() {
            "class_declaration" => Some(ComponentKind::Class),
            "interface_declaration" => Some(ComponentKind::Interface),
            "trait_declaration" => Some(ComponentKind::Trait),
            "enum_declaration" => Some(ComponentKind::Enum),
            _ => None,
        };
        if let Some(kind) = kind {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = self.text(name_node);
                self.emit_type(node, &name, kind);
                self.class_stack.push(name);
                let mut cursor = node.walk();
                let children: Vec<Node> = node.children(&mut cursor).collect();
                for child in children {
                    self.definitions(child, depth + 1);
                }
                self.class_stack.pop();
                return;
            }
        }

        match node.kind() {
            "function_definition" | "method_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(name_node);
                    self.emit_callable(node, &name);
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.definitions(child, depth + 1);
        }
    }

    fn emit_type(&mut self, node: Node, name: &str, kind: ComponentKind) {
        let id = self.component_id(name);
        let docstring = self.doc_above(node);
        let mut bases = Vec::new();

        // extends / implements clauses
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let edge_kind = match child.kind() {
                "base_clause" => Some(EdgeKind::Extends),
                "class_interface_clause" => Some(EdgeKind::Implements),
                _ => None,
            };
            if let Some(edge_kind) = edge_kind {
                let mut base_cursor = child.walk();
                for base in child.children(&mut base_cursor) {
                    if matches!(base.kind(), "name" | "qualified_name") {
                        let qualified = self.resolver.qualify(&self.text(base));
                        self.edges.push(
                            CallEdge::new(id.clone(), qualified.replace('\\', "."), edge_kind)
                                .at_line(base.start_position().row + 1),
                        );
                        bases.push(qualified);
                    }
                }
            }
        }

        self.components.push(Component {
            id,
            name: name.to_string(),
            kind,
            file_path: self.file_path.clone(),
            relative_path: self.relative_path.clone(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            source_code: Some(self.text(node)),
            has_doc: !docstring.is_empty(),
            docstring,
            parameters: None,
            base_types: (!bases.is_empty()).then_some(bases),
            enclosing_class: self.class_stack.last().cloned(),
            depends_on: Default::default(),
            attributes: Default::default(),
        });
    }

    fn emit_callable(&mut self, node: Node, name: &str) {
        let kind = if self.class_stack.is_empty() {
            ComponentKind::Function
        } else {
            ComponentKind::Method
        };
        let id = self.component_id(name);
        let docstring = self.doc_above(node);
        let parameters = node.child_by_field_name("parameters").and_then(|p| {
            let text = self.text(p);
            let inner = text
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .unwrap_or(&text);
            let list = split_top_level(inner);
            (!list.is_empty()).then_some(list)
        });

        self.components.push(Component {
            id,
            name: name.to_string(),
            kind,
            file_path: self.file_path.clone(),
            relative_path: self.relative_path.clone(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            source_code: Some(self.text(node)),
            has_doc: !docstring.is_empty(),
            docstring,
            parameters,
            base_types: None,
            enclosing_class: self.class_stack.last().cloned(),
            depends_on: Default::default(),
            attributes: Default::default(),
        });
    }

    fn doc_above(&self, node: Node) -> String {
        doc_comment_above(
            &self.lines,
            node.start_position().row,
            "//",
            Some(("/**", "*/")),
        )
    }

    // ── Calls ──

    fn calls(&mut self, root: Node) {
        let spans: Vec<(usize, usize, String, Option<String>)> = self
            .components
            .iter()
            .map(|c| {
                (
                    c.start_line,
                    c.end_line,
                    c.id.clone(),
                    c.enclosing_class.clone(),
                )
            })
            .collect();

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "function_call_expression" => {
                    if let Some(func) = node.child_by_field_name("function") {
                        let name = self.resolver.qualify(&self.text(func));
                        self.push_call(node, &spans, name, EdgeKind::Calls);
                    }
                }
                "object_creation_expression" => {
                    // new Foo(...) is an edge to Foo
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        if matches!(child.kind(), "name" | "qualified_name") {
                            let name = self.resolver.qualify(&self.text(child));
                            self.push_call(node, &spans, name, EdgeKind::Calls);
                            break;
                        }
                    }
                }
                "member_call_expression" => {
                    if let Some(name) = node.child_by_field_name("name") {
                        let method = self.text(name);
                        let target = node
                            .child_by_field_name("object")
                            .map(|o| self.text(o))
                            .unwrap_or_default();
                        let callee = if target == "$this" {
                            self.innermost(&spans, node)
                                .and_then(|(_, class)| class)
                                .map(|c| format!("{}.{}", c, method))
                                .unwrap_or(method)
                        } else {
                            method
                        };
                        self.push_call(node, &spans, callee, EdgeKind::Calls);
                    }
                }
                "scoped_call_expression" => {
                    let scope = node
                        .child_by_field_name("scope")
                        .map(|s| self.text(s))
                        .unwrap_or_default();
                    if let Some(name) = node.child_by_field_name("name") {
                        let method = self.text(name);
                        let callee = match scope.as_str() {
                            "self" | "static" | "parent" | "" => method,
                            s => format!("{}.{}", self.resolver.qualify(s), method),
                        };
                        self.push_call(node, &spans, callee, EdgeKind::Calls);
                    }
                }
                _ => {}
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
    }

    fn innermost(
        &self,
        spans: &[(usize, usize, String, Option<String>)],
        node: Node,
    ) -> Option<(String, Option<String>)> {
        let line = node.start_position().row + 1;
        spans
            .iter()
            .filter(|(start, end, _, _)| *start <= line && line <= *end)
            .min_by_key(|(start, end, _, _)| end - start)
            .map(|(_, _, id, class)| (id.clone(), class.clone()))
    }

    fn push_call(
        &mut self,
        node: Node,
        spans: &[(usize, usize, String, Option<String>)],
        callee: String,
        kind: EdgeKind,
    ) {
        let Some((caller, _)) = self.innermost(spans, node) else {
            return;
        };
        let callee = clean_callee(&callee.replace('\\', "."));
        if callee.is_empty() || callee.len() > 200 {
            return;
        }
        self.edges.push(
            CallEdge::new(caller, callee, kind).at_line(node.start_position().row + 1),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn run(content: &str) -> (Vec<Component>, Vec<CallEdge>) {
        let input = FileInput {
            file_path: Path::new("/repo/app/Service.php"),
            relative_path: "app/Service.php",
            content,
        };
        extract(&input)
    }

    #[test]
    fn resolver_expands_short_names() {
        let mut resolver = NamespaceResolver::default();
        resolver.set_namespace("App\\Services");
        resolver.add_use("App\\Models\\User", None);
        resolver.add_use("Vendor\\Log\\Logger", Some("Log"));

        assert_eq!(resolver.qualify("User"), "App\\Models\\User");
        assert_eq!(resolver.qualify("Log"), "Vendor\\Log\\Logger");
        assert_eq!(resolver.qualify("Helper"), "App\\Services\\Helper");
        assert_eq!(resolver.qualify("\\Global\\Thing"), "Global\\Thing");
        assert_eq!(resolver.qualify("User\\Query"), "App\\Models\\User\\Query");
    }

    #[test]
    fn classes_methods_and_new_edges() {
        let src = r#"<?php
namespace App;

use App\Models\User;

class Service
{
    public function run(): void
    {
        $user = new User();
        $this->finish();
    }

    private function finish(): void {}
}
"#;
        let (components, edges) = run(src);
        let ids: Vec<&str> = components.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"app.Service.Service"));
        assert!(ids.contains(&"app.Service.Service.run"));
        assert!(ids.contains(&"app.Service.Service.finish"));

        assert!(edges.iter().any(|e| e.caller == "app.Service.Service.run"
            && e.callee == "App.Models.User"));
        assert!(edges.iter().any(|e| e.caller == "app.Service.Service.run"
            && e.callee == "Service.finish"));
    }

    #[test]
    fn extends_and_implements_are_qualified() {
        let src = r#"<?php
namespace App;

use Core\Contracts\Runnable;

class Worker extends BaseWorker implements Runnable {}
"#;
        let (components, edges) = run(src);
        let worker = components.iter().find(|c| c.name == "Worker").unwrap();
        let bases = worker.base_types.as_ref().unwrap();
        assert!(bases.contains(&"App\\BaseWorker".to_string()));
        assert!(bases.contains(&"Core\\Contracts\\Runnable".to_string()));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Extends));
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Implements));
    }
}
