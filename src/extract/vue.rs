// extract/vue.rs
// Vue single-file-component strategy. The SFC envelope and template are
// parsed with the HTML grammar; the script block is delegated to the
// TypeScript/JavaScript engine with line numbers shifted back to the
// original .vue file. Template walking emits uses_component / calls /
// references edges against the file's vue_component.

use crate::extract::engine::{self, JAVASCRIPT_SPEC, TYPESCRIPT_SPEC};
use crate::extract::language::{module_path, Language};
use crate::extract::FileInput;
use crate::model::{CallEdge, Component, ComponentKind, EdgeKind};
use tracing::warn;
use tree_sitter::{Node, Parser};

/// Built-in tags that never count as component references.
const VUE_BUILTINS: &[&str] = &[
    "slot",
    "component",
    "transition",
    "transition-group",
    "keep-alive",
    "teleport",
    "suspense",
];

const VUE_REACTIVITY_FNS: &[&str] = &[
    "ref",
    "reactive",
    "computed",
    "readonly",
    "shallowRef",
    "shallowReactive",
    "toRef",
    "toRefs",
];

pub fn extract(input: &FileInput) -> (Vec<Component>, Vec<CallEdge>) {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&Language::Vue.grammar()) {
        tracing::error!("vue envelope parser init failed: {}", e);
        return (Vec::new(), Vec::new());
    }
    let Some(tree) = parser.parse(input.content, None) else {
        warn!("failed to parse {}", input.relative_path);
        return (Vec::new(), Vec::new());
    };

    let src = input.content.as_bytes();
    let component_id = module_path(input.relative_path);
    let mut components = Vec::new();
    let mut edges = Vec::new();

    // Stage 1: script block through the TS/JS engine, lines shifted.
    if let Some(script) = find_script_block(tree.root_node(), src) {
        let spec = if script.is_typescript {
            &TYPESCRIPT_SPEC
        } else {
            &JAVASCRIPT_SPEC
        };
        let script_input = FileInput {
            file_path: input.file_path,
            relative_path: input.relative_path,
            content: &script.content,
        };
        let (mut script_components, mut script_edges) = engine::extract(&script_input, spec);
        for component in &mut script_components {
            component.start_line += script.line_offset;
            component.end_line += script.line_offset;
        }
        for edge in &mut script_edges {
            if let Some(line) = edge.line.as_mut() {
                *line += script.line_offset;
            }
        }
        annotate_reactivity(&mut script_components);
        components.append(&mut script_components);
        edges.append(&mut script_edges);
    }

    // Stage 2: template walk.
    if let Some(template) = find_template(tree.root_node(), src) {
        walk_template(template, src, &component_id, &mut edges);
    }

    // Top-level vue_component spanning the whole file.
    let name = input
        .file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| component_id.clone());
    components.insert(
        0,
        Component {
            id: component_id,
            name,
            kind: ComponentKind::VueComponent,
            file_path: input.file_path.to_string_lossy().to_string(),
            relative_path: input.relative_path.to_string(),
            start_line: 1,
            end_line: input.content.lines().count().max(1),
            source_code: Some(input.content.to_string()),
            has_doc: false,
            docstring: String::new(),
            parameters: None,
            base_types: None,
            enclosing_class: None,
            depends_on: Default::default(),
            attributes: Default::default(),
        },
    );

    (components, edges)
}

struct ScriptBlock {
    content: String,
    is_typescript: bool,
    /// Added to every 1-based line number coming out of the script parse to
    /// land on the line the construct has in the original .vue file. Applied
    /// exactly once.
    line_offset: usize,
}

fn node_text(node: Node, src: &[u8]) -> String {
    node.utf8_text(src).unwrap_or_default().to_string()
}

fn find_script_block(root: Node, src: &[u8]) -> Option<ScriptBlock> {
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() != "script_element" {
            continue;
        }
        let mut raw_text = None;
        let mut is_typescript = false;
        let mut sub_cursor = child.walk();
        for sub in child.children(&mut sub_cursor) {
            match sub.kind() {
                "start_tag" => {
                    let tag = node_text(sub, src);
                    if tag.contains("lang=\"ts\"")
                        || tag.contains("lang='ts'")
                        || tag.contains("lang=\"tsx\"")
                        || tag.contains("setup")
                    {
                        is_typescript = true;
                    }
                }
                "raw_text" => raw_text = Some(sub),
                _ => {}
            }
        }
        let raw = raw_text?;
        let mut content = node_text(raw, src);
        let mut line_offset = raw.start_position().row;
        if content.starts_with('\n') {
            content.remove(0);
            line_offset += 1;
        }
        return Some(ScriptBlock {
            content,
            is_typescript,
            line_offset,
        });
    }
    None
}

fn find_template<'t>(root: Node<'t>, src: &[u8]) -> Option<Node<'t>> {
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "element" {
            if let Some(tag) = element_tag_name(child, src) {
                if tag == "template" {
                    return Some(child);
                }
            }
        }
    }
    None
}

fn element_tag_name(element: Node, src: &[u8]) -> Option<String> {
    let mut cursor = element.walk();
    for child in element.children(&mut cursor) {
        if matches!(child.kind(), "start_tag" | "self_closing_tag") {
            let mut tag_cursor = child.walk();
            for sub in child.children(&mut tag_cursor) {
                if sub.kind() == "tag_name" {
                    return Some(node_text(sub, src));
                }
            }
        }
    }
    None
}

fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn walk_template(template: Node, src: &[u8], component_id: &str, edges: &mut Vec<CallEdge>) {
    let mut stack = vec![template];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "start_tag" | "self_closing_tag" => {
                extract_tag(node, src, component_id, edges);
            }
            "text" => {
                extract_interpolations(node, src, component_id, edges);
            }
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
}

fn extract_tag(tag: Node, src: &[u8], component_id: &str, edges: &mut Vec<CallEdge>) {
    let mut cursor = tag.walk();
    for child in tag.children(&mut cursor) {
        match child.kind() {
            "tag_name" => {
                let name = node_text(child, src);
                let is_pascal = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
                if is_pascal && !VUE_BUILTINS.contains(&name.to_lowercase().as_str()) {
                    edges.push(
                        CallEdge::new(component_id, name, EdgeKind::UsesComponent)
                            .at_line(child.start_position().row + 1),
                    );
                }
            }
            "attribute" => {
                extract_directive(child, src, component_id, edges);
            }
            _ => {}
        }
    }
}

fn extract_directive(attribute: Node, src: &[u8], component_id: &str, edges: &mut Vec<CallEdge>) {
    let mut name = None;
    let mut value = None;
    let mut cursor = attribute.walk();
    for child in attribute.children(&mut cursor) {
        match child.kind() {
            "attribute_name" => name = Some(node_text(child, src)),
            "quoted_attribute_value" => {
                let mut value_cursor = child.walk();
                for v in child.children(&mut value_cursor) {
                    if v.kind() == "attribute_value" {
                        value = Some(node_text(v, src));
                    }
                }
            }
            "attribute_value" => value = Some(node_text(child, src)),
            _ => {}
        }
    }
    let (Some(name), Some(value)) = (name, value) else {
        return;
    };
    if !is_plain_identifier(&value) {
        return;
    }
    let line = attribute.start_position().row + 1;
    if name.starts_with('@') || name.starts_with("v-on:") {
        // @click="handleClick"
        edges.push(CallEdge::new(component_id, value, EdgeKind::Calls).at_line(line));
    } else if name.starts_with(':') || name.starts_with("v-bind:") {
        // :title="pageTitle"
        edges.push(CallEdge::new(component_id, value, EdgeKind::References).at_line(line));
    }
}

fn extract_interpolations(text: Node, src: &[u8], component_id: &str, edges: &mut Vec<CallEdge>) {
    let content = node_text(text, src);
    let base_line = text.start_position().row + 1;
    let mut rest = content.as_str();
    let mut consumed = 0usize;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let inner = rest[open + 2..open + 2 + close].trim();
        if is_plain_identifier(inner) {
            let line = base_line + content[..consumed + open].matches('\n').count();
            edges.push(
                CallEdge::new(component_id, inner, EdgeKind::References).at_line(line),
            );
        }
        consumed += open + 2 + close + 2;
        rest = &content[consumed..];
    }
}

/// Annotate script variables: reactivity wrappers get an attribute, the
/// defineProps / defineEmits macros become first-class kinds.
fn annotate_reactivity(components: &mut [Component]) {
    for component in components {
        if component.kind != ComponentKind::Variable {
            continue;
        }
        let Some(call) = component.attributes.get("initializer_call").cloned() else {
            continue;
        };
        let base = call.rsplit('.').next().unwrap_or(&call);
        match base {
            "defineProps" => component.kind = ComponentKind::VueProps,
            "defineEmits" => component.kind = ComponentKind::VueEmits,
            "defineExpose" | "defineSlots" | "defineModel" | "withDefaults" => {
                component
                    .attributes
                    .insert("vue_macro".to_string(), base.to_string());
            }
            f if VUE_REACTIVITY_FNS.contains(&f) => {
                component
                    .attributes
                    .insert("reactivity".to_string(), f.to_string());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const SFC: &str = r#"<template>
  <div>
    <MyChild @click="handleClick" :title="pageTitle">{{msg}}</MyChild>
    <transition name="fade"><p>{{ msg }}</p></transition>
  </div>
</template>
<script setup>
import MyChild from './MyChild.vue'

const msg = ref('hello')
const pageTitle = ref('title')
const props = defineProps(['kind'])

function handleClick() {
  console.log(msg)
}
</script>
"#;

    fn run(content: &str) -> (Vec<Component>, Vec<CallEdge>) {
        let input = FileInput {
            file_path: Path::new("/repo/components/MyPage.vue"),
            relative_path: "components/MyPage.vue",
            content,
        };
        extract(&input)
    }

    #[test]
    fn template_edges_from_the_component() {
        let (components, edges) = run(SFC);
        let id = "components.MyPage";
        assert_eq!(components[0].id, id);
        assert_eq!(components[0].kind, ComponentKind::VueComponent);

        assert!(edges
            .iter()
            .any(|e| e.caller == id && e.callee == "MyChild" && e.kind == EdgeKind::UsesComponent));
        assert!(edges
            .iter()
            .any(|e| e.caller == id && e.callee == "handleClick" && e.kind == EdgeKind::Calls));
        assert!(edges
            .iter()
            .any(|e| e.caller == id && e.callee == "pageTitle" && e.kind == EdgeKind::References));
        assert!(edges
            .iter()
            .any(|e| e.caller == id && e.callee == "msg" && e.kind == EdgeKind::References));
        // the <transition> built-in produces no uses_component edge
        assert!(!edges
            .iter()
            .any(|e| e.kind == EdgeKind::UsesComponent && e.callee.to_lowercase() == "transition"));
    }

    #[test]
    fn script_lines_are_shifted_exactly_once() {
        let (components, _) = run(SFC);
        let handle = components
            .iter()
            .find(|c| c.name == "handleClick")
            .expect("handleClick extracted from script block");
        let expected = SFC
            .lines()
            .position(|l| l.starts_with("function handleClick"))
            .unwrap()
            + 1;
        assert_eq!(handle.start_line, expected);
    }

    #[test]
    fn reactivity_and_macros_are_annotated() {
        let (components, _) = run(SFC);
        let msg = components.iter().find(|c| c.name == "msg").unwrap();
        assert_eq!(msg.attributes.get("reactivity").map(String::as_str), Some("ref"));

        let props = components.iter().find(|c| c.name == "props").unwrap();
        assert_eq!(props.kind, ComponentKind::VueProps);
    }
}
