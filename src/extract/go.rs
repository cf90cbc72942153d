// extract/go.rs
// Go strategy: functions, methods (receiver-normalized), structs, interfaces,
// imports, embedding, and call edges. Builtin functions and primitive types
// never produce edges.

use crate::extract::engine::doc_comment_above;
use crate::extract::language::{module_path, Language};
use crate::extract::FileInput;
use crate::model::{CallEdge, Component, ComponentKind, EdgeKind};
use std::collections::{HashMap, HashSet};
use tracing::warn;
use tree_sitter::{Node, Parser};

const GO_PRIMITIVES: &[&str] = &[
    "bool", "byte", "rune", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16",
    "uint32", "uint64", "uintptr", "float32", "float64", "complex64", "complex128", "string",
    "error", "any", "context", "time", "duration",
];

const GO_BUILTINS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "new",
    "panic", "print", "println", "real", "recover", "min", "max",
];

pub fn extract(input: &FileInput) -> (Vec<Component>, Vec<CallEdge>) {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&Language::Go.grammar()) {
        tracing::error!("go parser init failed: {}", e);
        return (Vec::new(), Vec::new());
    }
    let Some(tree) = parser.parse(input.content, None) else {
        warn!("failed to parse {}", input.relative_path);
        return (Vec::new(), Vec::new());
    };

    let mut walker = GoWalker {
        src: input.content.as_bytes(),
        lines: input.content.lines().collect(),
        module: module_path(input.relative_path),
        file_path: input.file_path.to_string_lossy().to_string(),
        relative_path: input.relative_path.to_string(),
        components: Vec::new(),
        edges: Vec::new(),
        imports: HashMap::new(),
        known_names: HashSet::new(),
    };
    walker.imports_and_definitions(tree.root_node(), 0);
    walker.relationships(tree.root_node(), 0, None, None);
    (walker.components, walker.edges)
}

struct GoWalker<'a> {
    src: &'a [u8],
    lines: Vec<&'a str>,
    module: String,
    file_path: String,
    relative_path: String,
    components: Vec<Component>,
    edges: Vec<CallEdge>,
    /// import alias -> full package path
    imports: HashMap<String, String>,
    /// short names and `Receiver.Method` names defined in this file
    known_names: HashSet<String>,
}

/// Strip pointer and generic decoration from a receiver type:
/// `*Store[T]` -> `Store`.
fn normalize_receiver(raw: &str) -> String {
    let mut t = raw.trim().trim_start_matches('*').to_string();
    if let Some(idx) = t.find('[') {
        t.truncate(idx);
    }
    t.trim().to_string()
}

fn is_primitive(name: &str) -> bool {
    let clean = name
        .trim_start_matches('*')
        .trim_start_matches("[]")
        .split('.')
        .next_back()
        .unwrap_or("");
    GO_PRIMITIVES.contains(&clean.to_lowercase().as_str())
}

fn is_builtin(name: &str) -> bool {
    let base = name.split('.').next_back().unwrap_or(name);
    GO_BUILTINS.contains(&base)
}

impl<'a> GoWalker<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    fn component_id(&self, name: &str, receiver: Option<&str>) -> String {
        match receiver {
            Some(r) => format!("{}.{}.{}", self.module, r, name),
            None => format!("{}.{}", self.module, name),
        }
    }

    fn find_child<'t>(&self, node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let result = node.children(&mut cursor).find(|c| c.kind() == kind);
        result
    }

    /// Receiver type of a method declaration, normalized.
    fn receiver_type(&self, node: Node) -> Option<String> {
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        for param in receiver.children(&mut cursor) {
            if param.kind() == "parameter_declaration" {
                if let Some(type_node) = param.child_by_field_name("type") {
                    let normalized = normalize_receiver(&self.text(type_node));
                    if !normalized.is_empty() {
                        return Some(normalized);
                    }
                }
            }
        }
        None
    }

    // ── Pass 1: imports and definitions ──

    fn imports_and_definitions(&mut self, node: Node, depth: usize) {
        if depth > 100 {
            return;
        }
        match node.kind() {
            "import_spec" => {
                let alias = self
                    .find_child(node, "package_identifier")
                    .map(|n| self.text(n));
                if let Some(path_node) = self.find_child(node, "interpreted_string_literal") {
                    let path = self.text(path_node).trim_matches('"').to_string();
                    let alias = alias
                        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(&path).to_string());
                    self.imports.insert(alias, path);
                }
            }
            "function_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(name_node);
                    self.emit_callable(node, &name, None);
                }
            }
            "method_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(name_node);
                    let receiver = self.receiver_type(node);
                    self.emit_callable(node, &name, receiver.as_deref());
                }
            }
            "type_spec" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = self.text(name_node);
                    let kind = if self.find_child(node, "struct_type").is_some() {
                        Some(ComponentKind::Struct)
                    } else if self.find_child(node, "interface_type").is_some() {
                        Some(ComponentKind::Interface)
                    } else {
                        None
                    };
                    if let Some(kind) = kind {
                        self.emit_type(node, &name, kind);
                    }
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.imports_and_definitions(child, depth + 1);
        }
    }

    fn emit_callable(&mut self, node: Node, name: &str, receiver: Option<&str>) {
        let kind = if receiver.is_some() {
            ComponentKind::Method
        } else {
            ComponentKind::Function
        };
        let id = self.component_id(name, receiver);
        let docstring = doc_comment_above(&self.lines, node.start_position().row, "//", None);
        let parameters = self.parameters(node);

        self.known_names.insert(name.to_string());
        if let Some(r) = receiver {
            self.known_names.insert(format!("{}.{}", r, name));
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
            parameters,
            base_types: None,
            enclosing_class: receiver.map(str::to_string),
            depends_on: Default::default(),
            attributes: Default::default(),
        });
    }

    fn emit_type(&mut self, node: Node, name: &str, kind: ComponentKind) {
        let id = self.component_id(name, None);
        // the doc comment sits above the enclosing type_declaration
        let decl_row = node
            .parent()
            .filter(|p| p.kind() == "type_declaration")
            .map(|p| p.start_position().row)
            .unwrap_or_else(|| node.start_position().row);
        let docstring = doc_comment_above(&self.lines, decl_row, "//", None);

        self.known_names.insert(name.to_string());
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
            base_types: None,
            enclosing_class: None,
            depends_on: Default::default(),
            attributes: Default::default(),
        });
    }

    fn parameters(&self, node: Node) -> Option<Vec<String>> {
        let params = node.child_by_field_name("parameters")?;
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            if param.kind() == "parameter_declaration" || param.kind() == "variadic_parameter_declaration" {
                let text = self.text(param).split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    out.push(text);
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    // ── Pass 2: calls and embedding ──

    fn relationships(
        &mut self,
        node: Node,
        depth: usize,
        current_fn: Option<&str>,
        current_receiver: Option<&str>,
    ) {
        if depth > 100 {
            return;
        }
        let (next_fn, next_receiver): (Option<String>, Option<String>) = match node.kind() {
            "function_declaration" => (
                node.child_by_field_name("name").map(|n| self.text(n)),
                None,
            ),
            "method_declaration" => (
                node.child_by_field_name("name").map(|n| self.text(n)),
                self.receiver_type(node),
            ),
            _ => (
                current_fn.map(str::to_string),
                current_receiver.map(str::to_string),
            ),
        };

        match node.kind() {
            "call_expression" => {
                if let Some(func) = next_fn.as_deref() {
                    self.emit_call(node, func, next_receiver.as_deref());
                }
            }
            "struct_type" | "interface_type" => {
                self.emit_embeddings(node);
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.relationships(child, depth + 1, next_fn.as_deref(), next_receiver.as_deref());
        }
    }

    fn emit_call(&mut self, node: Node, current_fn: &str, current_receiver: Option<&str>) {
        let Some(func_node) = node.child_by_field_name("function") else {
            return;
        };

        let mut callee = None;
        let mut receiver = None;
        match func_node.kind() {
            "identifier" => {
                callee = Some(self.text(func_node));
            }
            "selector_expression" => {
                let operand = func_node.child_by_field_name("operand");
                let field = func_node.child_by_field_name("field");
                if let Some(field) = field {
                    let method = self.text(field);
                    match operand {
                        Some(op) if op.kind() == "identifier" => {
                            let op_name = self.text(op);
                            if self.imports.contains_key(&op_name) {
                                callee = Some(format!("{}.{}", op_name, method));
                            } else {
                                receiver = Some(op_name);
                                callee = Some(method);
                            }
                        }
                        Some(op) if op.kind() == "selector_expression" => {
                            callee = Some(format!("{}.{}", self.text(op), method));
                        }
                        _ => callee = Some(method),
                    }
                }
            }
            _ => {}
        }

        let Some(callee) = callee else { return };
        if callee.is_empty() || is_builtin(&callee) {
            return;
        }

        let caller = self.component_id(current_fn, current_receiver);
        let callee_id = match &receiver {
            Some(r) if self.known_names.contains(&format!("{}.{}", r, callee)) => {
                self.component_id(&callee, Some(r))
            }
            Some(r) => format!("{}.{}", r, callee),
            None => callee,
        };
        self.edges.push(
            CallEdge::new(caller, callee_id, EdgeKind::Calls)
                .at_line(node.start_position().row + 1),
        );
    }

    /// Embedded struct/interface fields produce extends edges:
    /// a field that is only a type name, with no field name.
    fn emit_embeddings(&mut self, node: Node) {
        let Some(containing) = self.containing_type_name(node) else {
            return;
        };
        let caller = self.component_id(&containing, None);

        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match current.kind() {
                "field_declaration" => {
                    let has_name = current.child_by_field_name("name").is_some();
                    if !has_name {
                        if let Some(type_node) = current.child_by_field_name("type") {
                            let embedded = normalize_receiver(&self.text(type_node));
                            if !embedded.is_empty() && !is_primitive(&embedded) {
                                self.edges.push(
                                    CallEdge::new(caller.clone(), embedded, EdgeKind::Extends)
                                        .at_line(current.start_position().row + 1),
                                );
                            }
                        }
                    }
                }
                "field_declaration_list" | "struct_type" => {
                    let mut cursor = current.walk();
                    for child in current.children(&mut cursor) {
                        stack.push(child);
                    }
                }
                "interface_type" => {
                    let mut cursor = current.walk();
                    for child in current.children(&mut cursor) {
                        if child.kind() == "type_identifier"
                            || child.kind() == "type_elem"
                            || child.kind() == "qualified_type"
                        {
                            let embedded = normalize_receiver(&self.text(child));
                            if !embedded.is_empty() && !is_primitive(&embedded) {
                                self.edges.push(
                                    CallEdge::new(caller.clone(), embedded, EdgeKind::Extends)
                                        .at_line(child.start_position().row + 1),
                                );
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn containing_type_name(&self, node: Node) -> Option<String> {
        let mut current = node.parent();
        while let Some(n) = current {
            if n.kind() == "type_spec" {
                return n.child_by_field_name("name").map(|name| self.text(name));
            }
            current = n.parent();
        }
        None
    }
}
