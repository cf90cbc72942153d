// agent/tools.rs
// The read_code_components tool and the sub-module spawn decision backing
// generate_sub_module_documentation.

use crate::agent::context::AgentContext;
use crate::model::ModuleNode;
use crate::tokens;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ReadComponentsArgs {
    pub component_ids: Vec<String>,
}

/// Concatenated sources for the requested ids, each under a path/line
/// header. Unknown ids produce a per-id marker, never a failure.
pub fn read_code_components(ctx: &AgentContext, args: ReadComponentsArgs) -> String {
    let mut out = String::new();
    for id in &args.component_ids {
        match ctx.registry.get(id) {
            Some(component) => {
                out.push_str(&format!(
                    "# {} ({}:{}-{})\n",
                    id, component.relative_path, component.start_line, component.end_line
                ));
                match &component.source_code {
                    Some(source) => {
                        out.push_str(source);
                        if !source.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    None => out.push_str("[source not captured]\n"),
                }
                out.push('\n');
            }
            None => {
                out.push_str(&format!("# [unknown component: {}]\n\n", id));
            }
        }
    }
    if out.is_empty() {
        out.push_str("[no component ids given]");
    }
    out
}

pub fn read_components_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "component_ids": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Component ids to read, e.g. [\"src.auth.Service\"]."
            }
        },
        "required": ["component_ids"]
    })
}

#[derive(Debug, Deserialize)]
pub struct SubModuleArgs {
    pub module_name: String,
}

pub fn sub_module_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "module_name": {
                "type": "string",
                "description": "Name of the child module to document."
            }
        },
        "required": ["module_name"]
    })
}

/// Outcome of a generate_sub_module_documentation request.
pub enum SubModuleDecision {
    /// Spawn a recursive agent over this child path at depth + 1.
    Spawn(Vec<String>),
    /// The child does not qualify; tell the agent to document it inline.
    Inline,
    /// No child with that name under the current module.
    Unknown,
}

/// A child gets its own sub-agent only when all three hold: depth headroom
/// remains, the child is complex (components span more than one file), and
/// the child's combined component tokens exceed the leaf-module budget.
pub fn decide_sub_module(ctx: &AgentContext, child_name: &str) -> SubModuleDecision {
    let Some(current) = ctx.current_module() else {
        return SubModuleDecision::Unknown;
    };
    let Some(child) = current.children.get(child_name) else {
        return SubModuleDecision::Unknown;
    };

    if ctx.current_depth >= ctx.budgets.max_recursion_depth {
        return SubModuleDecision::Inline;
    }
    if !is_complex(child, ctx) {
        return SubModuleDecision::Inline;
    }
    let child_tokens = tokens::estimate_components(&child.components, &ctx.registry);
    if child_tokens <= ctx.budgets.max_tokens_per_leaf_module {
        return SubModuleDecision::Inline;
    }

    let mut path = ctx.module_path.clone();
    path.push(child_name.to_string());
    SubModuleDecision::Spawn(path)
}

/// A module is complex when its components span more than one source file.
pub fn is_complex(module: &ModuleNode, ctx: &AgentContext) -> bool {
    module.distinct_files(&ctx.registry) > 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::test_support::registry_of;
    use crate::llm::test_support::ScriptedBackend;
    use crate::model::ComponentKind;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn context(tree: ModuleNode, depth: usize) -> AgentContext {
        let mut registry = registry_of(&[
            ("a.f", "f", ComponentKind::Function),
            ("b.g", "g", ComponentKind::Function),
        ]);
        for component in registry.values_mut() {
            component.source_code = Some("x".repeat(200_000));
        }
        let config = Config::from_env(PathBuf::from("/repo"), PathBuf::from("/out"));
        let mut ctx = AgentContext::new(
            &config,
            Arc::new(registry),
            Arc::new(tree),
            Arc::new(ScriptedBackend::new(vec![])),
        );
        ctx.current_depth = depth;
        ctx
    }

    fn tree_with_child() -> ModuleNode {
        let mut root = ModuleNode::leaf("repo", vec![]);
        root.children.insert(
            "core".into(),
            ModuleNode::leaf("core", vec!["a.f".into(), "b.g".into()]),
        );
        root
    }

    #[test]
    fn read_components_marks_unknown_ids() {
        let ctx = context(tree_with_child(), 0);
        let out = read_code_components(
            &ctx,
            ReadComponentsArgs {
                component_ids: vec!["a.f".into(), "nope.x".into()],
            },
        );
        assert!(out.contains("# a.f (a.py:1-3)"));
        assert!(out.contains("[unknown component: nope.x]"));
    }

    #[test]
    fn oversize_complex_child_spawns_below_max_depth() {
        let ctx = context(tree_with_child(), 0);
        match decide_sub_module(&ctx, "core") {
            SubModuleDecision::Spawn(path) => assert_eq!(path, vec!["core".to_string()]),
            _ => panic!("expected spawn"),
        }
    }

    #[test]
    fn at_max_depth_the_child_documents_inline() {
        let config_depth = Config::from_env(PathBuf::from("/r"), PathBuf::from("/o"))
            .budgets
            .max_recursion_depth;
        let ctx = context(tree_with_child(), config_depth);
        assert!(matches!(
            decide_sub_module(&ctx, "core"),
            SubModuleDecision::Inline
        ));
    }

    #[test]
    fn small_child_documents_inline() {
        let mut ctx = context(tree_with_child(), 0);
        let mut registry = registry_of(&[
            ("a.f", "f", ComponentKind::Function),
            ("b.g", "g", ComponentKind::Function),
        ]);
        for component in registry.values_mut() {
            component.source_code = Some("tiny".into());
        }
        ctx.registry = Arc::new(registry);
        assert!(matches!(
            decide_sub_module(&ctx, "core"),
            SubModuleDecision::Inline
        ));
    }

    #[test]
    fn unknown_child_is_reported() {
        let ctx = context(tree_with_child(), 0);
        assert!(matches!(
            decide_sub_module(&ctx, "ghost"),
            SubModuleDecision::Unknown
        ));
    }
}
