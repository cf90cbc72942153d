// extract/engine.rs
// Generic two-pass traversal engine for grammar-driven languages.
// One walk emits definition components, a second walk emits call edges
// attributed to the innermost enclosing component. Language differences are
// confined to a NodeSpec table of node-kind names plus a few flags.

use crate::extract::language::{module_path, Language};
use crate::extract::FileInput;
use crate::model::{CallEdge, Component, ComponentKind, EdgeKind};
use std::collections::BTreeMap;
use tracing::warn;
use tree_sitter::{Node, Parser};

/// Node-kind tables parameterizing the generic engine for one language.
pub struct NodeSpec {
    pub language: Language,
    /// Definition node kinds producing type-like components.
    pub type_nodes: &'static [(&'static str, ComponentKind)],
    /// C-family `struct X;` forward references have no body and must not
    /// become components.
    pub type_requires_body: bool,
    /// Definition node kinds producing functions (methods when enclosed in a
    /// class-like definition).
    pub function_nodes: &'static [&'static str],
    /// Node kinds that are methods by construction.
    pub method_nodes: &'static [&'static str],
    /// Variable declarator kinds, extracted at module/class scope only.
    pub variable_nodes: &'static [&'static str],
    /// Call-site node kinds.
    pub call_nodes: &'static [&'static str],
    /// Constructor-invocation kinds, edges to the constructed type.
    pub new_nodes: &'static [&'static str],
    /// Clause kinds carrying base types.
    pub extends_nodes: &'static [&'static str],
    pub implements_nodes: &'static [&'static str],
    /// Parameter-list kinds searched among a definition's children.
    pub parameter_nodes: &'static [&'static str],
    /// Identifier kinds accepted when looking up a definition's name.
    pub name_kinds: &'static [&'static str],
    /// Resolve names through C-family declarator chains.
    pub uses_declarator_chain: bool,
    pub doc_line_prefix: &'static str,
    pub doc_block: Option<(&'static str, &'static str)>,
    /// Traversal recursion cap; pathological ASTs stop descending here.
    pub max_depth: usize,
}

pub static JAVA_SPEC: NodeSpec = NodeSpec {
    language: Language::Java,
    type_nodes: &[
        ("class_declaration", ComponentKind::Class),
        ("interface_declaration", ComponentKind::Interface),
        ("enum_declaration", ComponentKind::Enum),
        ("record_declaration", ComponentKind::Record),
        ("annotation_type_declaration", ComponentKind::Annotation),
    ],
    type_requires_body: false,
    function_nodes: &[],
    method_nodes: &["method_declaration", "constructor_declaration"],
    variable_nodes: &[],
    call_nodes: &["method_invocation"],
    new_nodes: &["object_creation_expression"],
    extends_nodes: &["superclass"],
    implements_nodes: &["super_interfaces"],
    parameter_nodes: &["formal_parameters"],
    name_kinds: &["identifier"],
    uses_declarator_chain: false,
    doc_line_prefix: "//",
    doc_block: Some(("/**", "*/")),
    max_depth: 200,
};

pub static CSHARP_SPEC: NodeSpec = NodeSpec {
    language: Language::CSharp,
    type_nodes: &[
        ("class_declaration", ComponentKind::Class),
        ("interface_declaration", ComponentKind::Interface),
        ("struct_declaration", ComponentKind::Struct),
        ("enum_declaration", ComponentKind::Enum),
        ("record_declaration", ComponentKind::Record),
    ],
    type_requires_body: false,
    function_nodes: &["local_function_statement"],
    method_nodes: &["method_declaration", "constructor_declaration"],
    variable_nodes: &[],
    call_nodes: &["invocation_expression"],
    new_nodes: &["object_creation_expression"],
    // The grammar does not split a base_list into extends vs implements;
    // every entry is emitted as an extends edge.
    extends_nodes: &["base_list"],
    implements_nodes: &[],
    parameter_nodes: &["parameter_list"],
    name_kinds: &["identifier"],
    uses_declarator_chain: false,
    doc_line_prefix: "//",
    doc_block: Some(("/**", "*/")),
    max_depth: 200,
};

pub static JAVASCRIPT_SPEC: NodeSpec = NodeSpec {
    language: Language::JavaScript,
    type_nodes: &[("class_declaration", ComponentKind::Class)],
    type_requires_body: false,
    function_nodes: &["function_declaration", "generator_function_declaration"],
    method_nodes: &["method_definition"],
    variable_nodes: &["variable_declarator"],
    call_nodes: &["call_expression"],
    new_nodes: &["new_expression"],
    extends_nodes: &["class_heritage"],
    implements_nodes: &[],
    parameter_nodes: &["formal_parameters"],
    name_kinds: &["identifier", "property_identifier"],
    uses_declarator_chain: false,
    doc_line_prefix: "//",
    doc_block: Some(("/**", "*/")),
    max_depth: 200,
};

pub static TYPESCRIPT_SPEC: NodeSpec = NodeSpec {
    language: Language::TypeScript,
    type_nodes: &[
        ("class_declaration", ComponentKind::Class),
        ("abstract_class_declaration", ComponentKind::Class),
        ("interface_declaration", ComponentKind::Interface),
        ("enum_declaration", ComponentKind::Enum),
        ("type_alias_declaration", ComponentKind::TypeAlias),
    ],
    type_requires_body: false,
    function_nodes: &["function_declaration", "generator_function_declaration"],
    method_nodes: &["method_definition", "method_signature"],
    variable_nodes: &["variable_declarator"],
    call_nodes: &["call_expression"],
    new_nodes: &["new_expression"],
    extends_nodes: &["extends_clause", "extends_type_clause"],
    implements_nodes: &["implements_clause"],
    parameter_nodes: &["formal_parameters"],
    name_kinds: &["identifier", "property_identifier", "type_identifier"],
    uses_declarator_chain: false,
    doc_line_prefix: "//",
    doc_block: Some(("/**", "*/")),
    // Deep JSX/type-expression trees have overflowed the stack before; the
    // walk stops descending past this depth.
    max_depth: 500,
};

pub static C_SPEC: NodeSpec = NodeSpec {
    language: Language::C,
    type_nodes: &[
        ("struct_specifier", ComponentKind::Struct),
        ("enum_specifier", ComponentKind::Enum),
        ("union_specifier", ComponentKind::Struct),
    ],
    type_requires_body: true,
    function_nodes: &["function_definition"],
    method_nodes: &[],
    variable_nodes: &[],
    call_nodes: &["call_expression"],
    new_nodes: &[],
    extends_nodes: &[],
    implements_nodes: &[],
    parameter_nodes: &["parameter_list"],
    name_kinds: &["identifier", "type_identifier", "field_identifier"],
    uses_declarator_chain: true,
    doc_line_prefix: "//",
    doc_block: Some(("/*", "*/")),
    max_depth: 200,
};

pub static CPP_SPEC: NodeSpec = NodeSpec {
    language: Language::Cpp,
    type_nodes: &[
        ("class_specifier", ComponentKind::Class),
        ("struct_specifier", ComponentKind::Struct),
        ("enum_specifier", ComponentKind::Enum),
        ("union_specifier", ComponentKind::Struct),
    ],
    type_requires_body: true,
    function_nodes: &["function_definition"],
    method_nodes: &[],
    variable_nodes: &[],
    call_nodes: &["call_expression"],
    new_nodes: &["new_expression"],
    extends_nodes: &["base_class_clause"],
    implements_nodes: &[],
    parameter_nodes: &["parameter_list"],
    name_kinds: &["identifier", "type_identifier", "field_identifier"],
    uses_declarator_chain: true,
    doc_line_prefix: "//",
    doc_block: Some(("/*", "*/")),
    max_depth: 200,
};

pub fn spec_for(language: Language) -> Option<&'static NodeSpec> {
    match language {
        Language::Java => Some(&JAVA_SPEC),
        Language::CSharp => Some(&CSHARP_SPEC),
        Language::JavaScript => Some(&JAVASCRIPT_SPEC),
        Language::TypeScript | Language::Tsx => Some(&TYPESCRIPT_SPEC),
        Language::C => Some(&C_SPEC),
        Language::Cpp => Some(&CPP_SPEC),
        _ => None,
    }
}

/// Run both passes over one file. Never fails: a grammar that refuses to load
/// or a source that refuses to parse yields an empty result with a log line.
pub fn extract(input: &FileInput, spec: &'static NodeSpec) -> (Vec<Component>, Vec<CallEdge>) {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&spec.language.grammar()) {
        tracing::error!(
            "parser init failed for {}: {}",
            spec.language.tag(),
            e
        );
        return (Vec::new(), Vec::new());
    }
    let Some(tree) = parser.parse(input.content, None) else {
        warn!("failed to parse {}", input.relative_path);
        return (Vec::new(), Vec::new());
    };

    let mut walker = Walker::new(input, spec);
    walker.collect_definitions(tree.root_node(), 0);
    walker.collect_edges(tree.root_node(), 0);
    (walker.components, walker.edges)
}

struct Walker<'a> {
    spec: &'static NodeSpec,
    src: &'a [u8],
    lines: Vec<&'a str>,
    module: String,
    file_path: String,
    relative_path: String,
    components: Vec<Component>,
    edges: Vec<CallEdge>,
    class_stack: Vec<String>,
    fn_depth: usize,
}

impl<'a> Walker<'a> {
    fn new(input: &'a FileInput<'a>, spec: &'static NodeSpec) -> Self {
        Self {
            spec,
            src: input.content.as_bytes(),
            lines: input.content.lines().collect(),
            module: module_path(input.relative_path),
            file_path: input.file_path.to_string_lossy().to_string(),
            relative_path: input.relative_path.to_string(),
            components: Vec::new(),
            edges: Vec::new(),
            class_stack: Vec::new(),
            fn_depth: 0,
        }
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    // ── Pass 1: definitions ──

    fn collect_definitions(&mut self, node: Node, depth: usize) {
        if depth > self.spec.max_depth {
            return;
        }
        let kind = node.kind();

        if let Some((_, component_kind)) =
            self.spec.type_nodes.iter().find(|(k, _)| *k == kind)
        {
            if !self.spec.type_requires_body || node.child_by_field_name("body").is_some() {
                if let Some(name) = self.definition_name(node) {
                    self.emit_type(node, name.clone(), component_kind.clone());
                    self.class_stack.push(name);
                    self.descend_definitions(node, depth);
                    self.class_stack.pop();
                    return;
                }
            }
        }

        if self.spec.function_nodes.contains(&kind) || self.spec.method_nodes.contains(&kind) {
            if let Some((name, scope)) = self.function_name(node) {
                self.emit_function(node, name, scope);
            }
            self.fn_depth += 1;
            self.descend_definitions(node, depth);
            self.fn_depth -= 1;
            return;
        }

        if self.spec.variable_nodes.contains(&kind) && self.fn_depth == 0 {
            self.emit_variable(node);
            // no descent: the initializer is part of the variable span
            return;
        }

        self.descend_definitions(node, depth);
    }

    fn descend_definitions(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.collect_definitions(child, depth + 1);
        }
    }

    fn definition_name(&self, node: Node) -> Option<String> {
        if let Some(name_node) = node.child_by_field_name("name") {
            return Some(self.text(name_node));
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if self.spec.name_kinds.contains(&child.kind()) {
                return Some(self.text(child));
            }
        }
        None
    }

    /// Name of a function definition, plus an out-of-line scope for C++
    /// `Type::method` declarators.
    fn function_name(&self, node: Node) -> Option<(String, Option<String>)> {
        if self.spec.uses_declarator_chain {
            let mut current = node.child_by_field_name("declarator")?;
            loop {
                match current.kind() {
                    "function_declarator" => {
                        current = current.child_by_field_name("declarator")?;
                    }
                    "pointer_declarator" | "reference_declarator" => {
                        current = current.child_by_field_name("declarator").or_else(|| {
                            let count = current.named_child_count();
                            if count == 0 {
                                None
                            } else {
                                current.named_child(count - 1)
                            }
                        })?;
                    }
                    "qualified_identifier" => {
                        let scope = current
                            .child_by_field_name("scope")
                            .map(|s| self.text(s));
                        let name = current
                            .child_by_field_name("name")
                            .map(|n| self.text(n))?;
                        return Some((name, scope));
                    }
                    "identifier" | "field_identifier" | "destructor_name" => {
                        return Some((self.text(current), None));
                    }
                    _ => {
                        current = current.named_child(0)?;
                    }
                }
            }
        }
        self.definition_name(node).map(|n| (n, None))
    }

    fn component_id(&self, name: &str, class: Option<&str>) -> String {
        match class {
            Some(class) => format!("{}.{}.{}", self.module, class, name),
            None => format!("{}.{}", self.module, name),
        }
    }

    fn base_component(&self, node: Node, id: String, name: String, kind: ComponentKind) -> Component {
        let docstring = self.doc_comment_above(node.start_position().row);
        Component {
            id,
            name,
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
        }
    }

    fn emit_type(&mut self, node: Node, name: String, kind: ComponentKind) {
        let enclosing = self.class_stack.last().cloned();
        let id = self.component_id(&name, enclosing.as_deref());
        let mut component = self.base_component(node, id.clone(), name, kind);
        component.enclosing_class = enclosing;

        let mut bases = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let child_kind = child.kind();
            let edge_kind = if self.spec.extends_nodes.contains(&child_kind) {
                Some(EdgeKind::Extends)
            } else if self.spec.implements_nodes.contains(&child_kind) {
                Some(EdgeKind::Implements)
            } else {
                None
            };
            if let Some(edge_kind) = edge_kind {
                for base in self.heritage_types(child) {
                    self.edges.push(
                        CallEdge::new(id.clone(), base.clone(), edge_kind)
                            .at_line(child.start_position().row + 1),
                    );
                    bases.push(base);
                }
            }
        }
        if !bases.is_empty() {
            component.base_types = Some(bases);
        }
        self.components.push(component);
    }

    fn heritage_types(&self, clause: Node) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![clause];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "type_identifier" | "identifier" => {
                    let text = self.text(node);
                    if !out.contains(&text) {
                        out.push(text);
                    }
                }
                _ => {
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        stack.push(child);
                    }
                }
            }
        }
        out.reverse();
        out
    }

    fn emit_function(&mut self, node: Node, name: String, out_of_line_scope: Option<String>) {
        let enclosing = out_of_line_scope.or_else(|| self.class_stack.last().cloned());
        let kind = if enclosing.is_some() {
            ComponentKind::Method
        } else {
            ComponentKind::Function
        };
        let id = self.component_id(&name, enclosing.as_deref());
        let mut component = self.base_component(node, id, name, kind);
        component.enclosing_class = enclosing;
        component.parameters = self.parameters(node);
        self.components.push(component);
    }

    fn emit_variable(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        if !self.spec.name_kinds.contains(&name_node.kind()) {
            return;
        }
        let name = self.text(name_node);
        let value_kind = node
            .child_by_field_name("value")
            .map(|v| v.kind())
            .unwrap_or("");
        let kind = if matches!(value_kind, "arrow_function" | "function_expression" | "function") {
            if self.class_stack.is_empty() {
                ComponentKind::Function
            } else {
                ComponentKind::Method
            }
        } else {
            ComponentKind::Variable
        };
        let enclosing = self.class_stack.last().cloned();
        let id = self.component_id(&name, enclosing.as_deref());
        let mut component = self.base_component(node, id, name, kind);
        component.enclosing_class = enclosing;
        if let Some(value) = node.child_by_field_name("value") {
            if value.kind() == "call_expression" {
                if let Some(callee) = value.child_by_field_name("function") {
                    component
                        .attributes
                        .insert("initializer_call".to_string(), self.text(callee));
                }
            }
        }
        self.components.push(component);
    }

    fn parameters(&self, node: Node) -> Option<Vec<String>> {
        let mut cursor = node.walk();
        let list = node
            .children(&mut cursor)
            .find(|c| self.spec.parameter_nodes.contains(&c.kind()))
            .or_else(|| node.child_by_field_name("parameters"))?;
        let text = self.text(list);
        let inner = text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .unwrap_or(&text);
        let params = split_top_level(inner);
        if params.is_empty() {
            None
        } else {
            Some(params)
        }
    }

    fn doc_comment_above(&self, row: usize) -> String {
        doc_comment_above(
            &self.lines,
            row,
            self.spec.doc_line_prefix,
            self.spec.doc_block,
        )
    }

    // ── Pass 2: call edges ──

    fn collect_edges(&mut self, root: Node, _depth: usize) {
        // Caller attribution is by byte-span containment against the pass-1
        // components, so this pass needs no language-specific scope tracking.
        let spans: Vec<(usize, usize, String)> = self
            .components
            .iter()
            .map(|c| (c.start_line, c.end_line, c.id.clone()))
            .collect();

        let mut stack = vec![(root, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depth > self.spec.max_depth {
                continue;
            }
            let kind = node.kind();
            if self.spec.call_nodes.contains(&kind) {
                self.emit_call(node, &spans, EdgeKind::Calls);
            } else if self.spec.new_nodes.contains(&kind) {
                self.emit_new(node, &spans);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push((child, depth + 1));
            }
        }
    }

    fn innermost_caller(&self, spans: &[(usize, usize, String)], line: usize) -> Option<String> {
        spans
            .iter()
            .filter(|(start, end, _)| *start <= line && line <= *end)
            .min_by_key(|(start, end, _)| end - start)
            .map(|(_, _, id)| id.clone())
    }

    fn emit_call(&mut self, node: Node, spans: &[(usize, usize, String)], kind: EdgeKind) {
        let line = node.start_position().row + 1;
        let Some(caller) = self.innermost_caller(spans, line) else {
            return;
        };
        let Some(callee) = self.callee_text(node) else {
            return;
        };
        self.edges
            .push(CallEdge::new(caller, callee, kind).at_line(line));
    }

    fn emit_new(&mut self, node: Node, spans: &[(usize, usize, String)]) {
        let line = node.start_position().row + 1;
        let Some(caller) = self.innermost_caller(spans, line) else {
            return;
        };
        let target = node
            .child_by_field_name("type")
            .or_else(|| node.child_by_field_name("constructor"))
            .map(|n| clean_callee(&self.text(n)));
        if let Some(target) = target.filter(|t| !t.is_empty()) {
            self.edges
                .push(CallEdge::new(caller, target, EdgeKind::Calls).at_line(line));
        }
    }

    fn callee_text(&self, call: Node) -> Option<String> {
        let target = call
            .child_by_field_name("function")
            .or_else(|| call.child_by_field_name("name"))
            .or_else(|| call.named_child(0))?;
        let mut text = clean_callee(&self.text(target));
        // Java keeps the receiver in a sibling field.
        if let Some(object) = call.child_by_field_name("object") {
            let prefix = clean_callee(&self.text(object));
            if !prefix.is_empty() && !prefix.contains('\n') {
                text = format!("{}.{}", prefix, text);
            }
        }
        if text.is_empty() || text.len() > 200 {
            return None;
        }
        Some(text)
    }
}

/// Normalize a callee expression into a dotted name: scope operators mapped
/// to dots, generic arguments and call suffixes stripped.
pub fn clean_callee(raw: &str) -> String {
    let mut text = raw.trim().replace("::", ".");
    if let Some(idx) = text.find('(') {
        text.truncate(idx);
    }
    if let Some(idx) = text.find('<') {
        text.truncate(idx);
    }
    text.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '$' && c != '.')
        .to_string()
}

/// Split a parameter list on top-level commas (nested brackets preserved).
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' | '[' | '{' | '<' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' | '>' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    out.push(trimmed);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
    out
}

/// Collect an adjacent comment block ending on the line directly above `row`.
pub fn doc_comment_above(
    lines: &[&str],
    row: usize,
    line_prefix: &str,
    block: Option<(&str, &str)>,
) -> String {
    if row == 0 {
        return String::new();
    }
    let mut collected: Vec<String> = Vec::new();
    let mut i = row;
    while i > 0 {
        i -= 1;
        let line = lines.get(i).map(|l| l.trim()).unwrap_or("");
        if !line_prefix.is_empty() && line.starts_with(line_prefix) {
            collected.insert(0, line[line_prefix.len()..].trim().to_string());
            continue;
        }
        if let Some((open, close)) = block {
            if line.ends_with(close) {
                // walk back to the opening marker
                let mut block_lines = vec![line.to_string()];
                while i > 0 && !block_lines[0].contains(open) {
                    i -= 1;
                    block_lines.insert(0, lines.get(i).map(|l| l.trim()).unwrap_or("").to_string());
                }
                let text = block_lines
                    .iter()
                    .map(|l| {
                        l.trim_start_matches(open)
                            .trim_end_matches(close)
                            .trim_start_matches('*')
                            .trim()
                            .to_string()
                    })
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !text.is_empty() {
                    collected.insert(0, text);
                }
                break;
            }
        }
        if line.is_empty() && collected.is_empty() {
            continue;
        }
        break;
    }
    collected.join("\n")
}

/// Merge a stream of components into a registry keyed by id, warning on and
/// keeping the first of any duplicate.
pub fn merge_components(
    components: Vec<Component>,
    registry: &mut BTreeMap<String, Component>,
) {
    for component in components {
        if registry.contains_key(&component.id) {
            warn!("duplicate component id '{}', keeping first occurrence", component.id);
            continue;
        }
        registry.insert(component.id.clone(), component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_callee_normalizes() {
        assert_eq!(clean_callee("Foo::bar"), "Foo.bar");
        assert_eq!(clean_callee("make<T>"), "make");
        assert_eq!(clean_callee("obj.method"), "obj.method");
        assert_eq!(clean_callee("  helper  "), "helper");
    }

    #[test]
    fn split_top_level_respects_nesting() {
        assert_eq!(
            split_top_level("a: Map<K, V>, b: int"),
            vec!["a: Map<K, V>", "b: int"]
        );
        assert_eq!(split_top_level(""), Vec::<String>::new());
    }

    #[test]
    fn doc_comment_line_run() {
        let lines = vec!["// first", "// second", "fn x() {}"];
        assert_eq!(
            doc_comment_above(&lines, 2, "//", None),
            "first\nsecond"
        );
    }

    #[test]
    fn doc_comment_block() {
        let lines = vec!["/**", " * Adds numbers.", " */", "int add(int a, int b);"];
        assert_eq!(
            doc_comment_above(&lines, 3, "//", Some(("/*", "*/"))),
            "Adds numbers."
        );
    }
}
