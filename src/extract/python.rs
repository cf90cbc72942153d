// extract/python.rs
// Python strategy: classes, functions, methods, docstrings, call edges.

use crate::extract::engine::{clean_callee, split_top_level};
use crate::extract::language::{module_path, Language};
use crate::extract::FileInput;
use crate::model::{CallEdge, Component, ComponentKind, EdgeKind};
use tracing::warn;
use tree_sitter::{Node, Parser};

pub fn extract(input: &FileInput) -> (Vec<Component>, Vec<CallEdge>) {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&Language::Python.grammar()) {
        tracing::error!("python parser init failed: {}", e);
        return (Vec::new(), Vec::new());
    }
    let Some(tree) = parser.parse(input.content, None) else {
        warn!("failed to parse {}", input.relative_path);
        return (Vec::new(), Vec::new());
    };

    let mut walker = PyWalker {
        src: input.content.as_bytes(),
        module: module_path(input.relative_path),
        file_path: input.file_path.to_string_lossy().to_string(),
        relative_path: input.relative_path.to_string(),
        components: Vec::new(),
        edges: Vec::new(),
        class_stack: Vec::new(),
    };
    walker.definitions(tree.root_node());
    walker.calls(tree.root_node());
    (walker.components, walker.edges)
}

struct PyWalker<'a> {
    src: &'a [u8],
    module: String,
    file_path: String,
    relative_path: String,
    components: Vec<Component>,
    edges: Vec<CallEdge>,
    class_stack: Vec<String>,
}

impl<'a> PyWalker<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    fn component_id(&self, name: &str) -> String {
        match self.class_stack.last() {
            Some(class) => format!("{}.{}.{}", self.module, class, name),
            None => format!("{}.{}", self.module, name),
        }
    }

    fn definitions(&mut self, node: Node) {
        match node.kind() {
            "class_definition" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(name_node);
                    self.emit_class(node, &name);
                    self.class_stack.push(name);
                    if let Some(body) = node.child_by_field_name("body") {
                        self.descend(body);
                    }
                    self.class_stack.pop();
                }
                return;
            }
            "function_definition" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(name_node);
                    self.emit_function(node, &name);
                }
                // nested defs still become components of the same scope
                if let Some(body) = node.child_by_field_name("body") {
                    self.descend(body);
                }
                return;
            }
            _ => {}
        }
        self.descend(node);
    }

    fn descend(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.definitions(child);
        }
    }

    fn emit_class(&mut self, node: Node, name: &str) {
        let id = self.component_id(name);
        let mut component = self.base_component(node, id.clone(), name, ComponentKind::Class);

        if let Some(supers) = node.child_by_field_name("superclasses") {
            let mut bases = Vec::new();
            let mut cursor = supers.walk();
            for child in supers.children(&mut cursor) {
                if matches!(child.kind(), "identifier" | "attribute") {
                    let base = clean_callee(&self.text(child));
                    if !base.is_empty() {
                        self.edges.push(
                            CallEdge::new(id.clone(), base.clone(), EdgeKind::Extends)
                                .at_line(child.start_position().row + 1),
                        );
                        bases.push(base);
                    }
                }
            }
            if !bases.is_empty() {
                component.base_types = Some(bases);
            }
        }
        self.components.push(component);
    }

    fn emit_function(&mut self, node: Node, name: &str) {
        let kind = if self.class_stack.is_empty() {
            ComponentKind::Function
        } else {
            ComponentKind::Method
        };
        let id = self.component_id(name);
        let mut component = self.base_component(node, id, name, kind);
        component.enclosing_class = self.class_stack.last().cloned();
        if let Some(params) = node.child_by_field_name("parameters") {
            let text = self.text(params);
            let inner = text
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .unwrap_or(&text);
            let list = split_top_level(inner);
            if !list.is_empty() {
                component.parameters = Some(list);
            }
        }
        self.components.push(component);
    }

    fn base_component(&self, node: Node, id: String, name: &str, kind: ComponentKind) -> Component {
        Component {
            id,
            name: name.to_string(),
            kind,
            file_path: self.file_path.clone(),
            relative_path: self.relative_path.clone(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            source_code: Some(self.text(node)),
            has_doc: self.docstring(node).is_some(),
            docstring: self.docstring(node).unwrap_or_default(),
            parameters: None,
            base_types: None,
            enclosing_class: None,
            depends_on: Default::default(),
            attributes: Default::default(),
        }
    }

    /// First statement of the body, when it is a bare string literal.
    fn docstring(&self, node: Node) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = first.named_child(0)?;
        if expr.kind() != "string" {
            return None;
        }
        let raw = self.text(expr);
        let trimmed = raw
            .trim_start_matches(|c| c == 'r' || c == 'b' || c == 'f' || c == 'u')
            .trim_matches('"')
            .trim_matches('\'')
            .trim();
        Some(trimmed.to_string()).filter(|s| !s.is_empty())
    }

    // ── Pass 2: call sites ──

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
            if node.kind() == "call" {
                self.emit_call(node, &spans);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
    }

    fn emit_call(&mut self, node: Node, spans: &[(usize, usize, String, Option<String>)]) {
        let line = node.start_position().row + 1;
        let Some((caller, caller_class)) = spans
            .iter()
            .filter(|(start, end, _, _)| *start <= line && line <= *end)
            .min_by_key(|(start, end, _, _)| end - start)
            .map(|(_, _, id, class)| (id.clone(), class.clone()))
        else {
            return;
        };

        let Some(func) = node.child_by_field_name("function") else {
            return;
        };
        let mut callee = clean_callee(&self.text(func));
        if callee.is_empty() || callee.len() > 200 {
            return;
        }
        // `self.helper()` resolves against the enclosing class.
        if let Some(rest) = callee.strip_prefix("self.") {
            callee = match &caller_class {
                Some(class) => format!("{}.{}", class, rest),
                None => rest.to_string(),
            };
        }
        self.edges
            .push(CallEdge::new(caller, callee, EdgeKind::Calls).at_line(line));
    }
}
