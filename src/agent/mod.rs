// agent/mod.rs
// Agent runtime: runs a tool-equipped model over one module until the
// documentation artifact exists. At-most-once per module (artifact-on-disk
// check), serial tool dispatch, shape repair before decoding, and failure
// propagation per the taxonomy: tool violations go back to the model,
// model-chain exhaustion aborts the invocation.

pub mod context;
pub mod editor;
pub mod mermaid;
pub mod tools;

use crate::agent::context::AgentContext;
use crate::agent::tools::SubModuleDecision;
use crate::error::{AgentError, LlmError};
use crate::llm::{
    repair_tool_arguments, ChatMessage, ChatRequest, FallbackChain, ToolCall, ToolSchema,
};
use crate::model::ModuleNode;
use crate::prompts;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{debug, info};

/// Upper bound on model turns per invocation; hitting it is an agent
/// give-up, not a silent truncation.
const MAX_TURNS: usize = 40;

/// Artifact file name for a module, flat in the docs directory. Modules
/// whose name collides with another node anywhere in the tree use their
/// dotted path instead.
pub fn artifact_name(tree: &ModuleNode, module_path: &[String]) -> String {
    let name = module_path
        .last()
        .cloned()
        .unwrap_or_else(|| tree.name.clone());

    fn count(node: &ModuleNode, name: &str) -> usize {
        let mut n = usize::from(node.name == name);
        for child in node.children.values() {
            n += count(child, name);
        }
        n
    }

    if !module_path.is_empty() && count(tree, &name) > 1 {
        format!("{}.md", module_path.join("."))
    } else {
        format!("{}.md", name)
    }
}

pub fn artifact_path(ctx: &AgentContext, module_path: &[String]) -> PathBuf {
    ctx.docs_dir
        .join(artifact_name(&ctx.module_tree, module_path))
}

/// Document one module with the agent. Succeeds silently when the artifact
/// already exists; otherwise the artifact must exist when the agent stops.
pub async fn document_module(
    ctx: &AgentContext,
    module_path: Vec<String>,
    depth: usize,
) -> Result<PathBuf, AgentError> {
    run_boxed(ctx.for_module(module_path, depth)).await
}

fn run_boxed(
    ctx: AgentContext,
) -> Pin<Box<dyn Future<Output = Result<PathBuf, AgentError>> + Send>> {
    Box::pin(async move { run(ctx).await })
}

async fn run(ctx: AgentContext) -> Result<PathBuf, AgentError> {
    let module_label = if ctx.module_path.is_empty() {
        ctx.module_tree.name.clone()
    } else {
        ctx.module_path.join("/")
    };
    let module = ctx
        .current_module()
        .ok_or_else(|| AgentError::GaveUp {
            module: module_label.clone(),
            reason: "module path not found in tree".into(),
        })?
        .clone();

    let artifact = artifact_path(&ctx, &ctx.module_path);
    if artifact.exists() {
        info!("skipping module {} (artifact already exists)", module_label);
        return Ok(artifact);
    }

    let complex = tools::is_complex(&module, &ctx);
    let module_name = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| module.name.clone());

    let system = prompts::agent_system_prompt(
        &module_name,
        complex,
        ctx.doc_type,
        ctx.custom_instructions.as_deref(),
    );
    let user = prompts::agent_user_prompt(
        &module_name,
        &module.components,
        &ctx.registry,
        &ctx.module_tree,
        &ctx.focus_modules,
    );

    let mut messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    let tool_schemas = tool_schemas(complex);
    let chain = FallbackChain::new(ctx.model_chain.clone());

    for _turn in 0..MAX_TURNS {
        let request = ChatRequest {
            model: String::new(),
            messages: messages.clone(),
            tools: Some(tool_schemas.clone()),
            max_tokens: ctx.budgets.max_output_tokens,
            temperature: 0.0,
        };
        let response = chain
            .chat(ctx.backend.as_ref(), request)
            .await
            .map_err(|e| AgentError::Model {
                module: module_label.clone(),
                source: e,
            })?;
        let message = response
            .message()
            .map_err(|e: LlmError| AgentError::Model {
                module: module_label.clone(),
                source: e,
            })?
            .clone();

        let tool_calls = message.tool_calls.clone().unwrap_or_default();
        messages.push(message);

        if tool_calls.is_empty() {
            // The model is done talking; the artifact decides success.
            if artifact.exists() {
                info!("module {} documented at {:?}", module_label, artifact);
                return Ok(artifact);
            }
            return Err(AgentError::GaveUp {
                module: module_label,
                reason: "agent finished without creating the documentation artifact".into(),
            });
        }

        // Tool calls observe strict serial order.
        for call in tool_calls {
            let result = dispatch(&ctx, &call).await?;
            messages.push(ChatMessage::tool_result(call.id.clone(), result));
        }
    }

    Err(AgentError::GaveUp {
        module: module_label,
        reason: format!("agent exceeded {} turns", MAX_TURNS),
    })
}

/// Dispatch one tool call. `Ok` carries the tool result (errors included,
/// prefixed so the model can recover); `Err` is reserved for hard failures
/// of a spawned sub-agent.
async fn dispatch(ctx: &AgentContext, call: &ToolCall) -> Result<String, AgentError> {
    let (arguments, repaired) = repair_tool_arguments(&call.function.arguments);
    if repaired {
        debug!(
            "repaired stringified array arguments for tool call {}",
            call.function.name
        );
    }

    match call.function.name.as_str() {
        "str_replace_editor" => Ok(match serde_json::from_str(&arguments) {
            Ok(args) => match editor::run(ctx, args) {
                Ok(out) => out,
                Err(e) => format!("Error: {}", e),
            },
            Err(e) => format!("Error: invalid str_replace_editor arguments: {}", e),
        }),
        "read_code_components" => Ok(match serde_json::from_str(&arguments) {
            Ok(args) => tools::read_code_components(ctx, args),
            Err(e) => format!("Error: invalid read_code_components arguments: {}", e),
        }),
        "generate_sub_module_documentation" => {
            let args: tools::SubModuleArgs = match serde_json::from_str(&arguments) {
                Ok(args) => args,
                Err(e) => {
                    return Ok(format!(
                        "Error: invalid generate_sub_module_documentation arguments: {}",
                        e
                    ))
                }
            };
            match tools::decide_sub_module(ctx, &args.module_name) {
                SubModuleDecision::Spawn(child_path) => {
                    info!(
                        "spawning sub-agent for {} at depth {}",
                        args.module_name,
                        ctx.current_depth + 1
                    );
                    let child_ctx = ctx.for_module(child_path, ctx.current_depth + 1);
                    let artifact = run_boxed(child_ctx).await?;
                    Ok(format!(
                        "Sub-module documentation generated at {}.",
                        artifact.display()
                    ))
                }
                SubModuleDecision::Inline => Ok(prompts::DOCUMENT_INLINE_MESSAGE.to_string()),
                SubModuleDecision::Unknown => Ok(format!(
                    "Error: no child module named '{}' under the current module",
                    args.module_name
                )),
            }
        }
        other => Ok(format!("Error: unknown tool '{}'", other)),
    }
}

fn tool_schemas(complex: bool) -> Vec<ToolSchema> {
    let mut schemas = vec![
        ToolSchema::function(
            "read_code_components",
            "Read the source of repository components by id.",
            tools::read_components_schema(),
        ),
        ToolSchema::function(
            "str_replace_editor",
            "View, create, and edit files. The repository is view-only; \
             documentation files live in the output directory.",
            editor::schema(),
        ),
    ];
    if complex {
        schemas.push(ToolSchema::function(
            "generate_sub_module_documentation",
            "Generate documentation for a child module via a recursive sub-agent.",
            tools::sub_module_schema(),
        ));
    }
    schemas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::test_support::registry_of;
    use crate::llm::test_support::ScriptedBackend;
    use crate::model::ComponentKind;
    use std::fs;
    use std::sync::Arc;

    fn simple_tree() -> ModuleNode {
        let mut root = ModuleNode::leaf("repo", vec![]);
        root.children
            .insert("core".into(), ModuleNode::leaf("core", vec!["a.f".into()]));
        root
    }

    fn context(backend: Arc<ScriptedBackend>, docs_dir: std::path::PathBuf) -> AgentContext {
        let registry = registry_of(&[("a.f", "f", ComponentKind::Function)]);
        let mut config = Config::from_env(std::env::temp_dir(), docs_dir);
        config.main_model = "test-model".into();
        AgentContext::new(
            &config,
            Arc::new(registry),
            Arc::new(simple_tree()),
            backend,
        )
    }

    #[test]
    fn artifact_names_disambiguate_collisions() {
        let mut root = ModuleNode::leaf("repo", vec![]);
        let mut api = ModuleNode::leaf("api", vec![]);
        api.children
            .insert("util".into(), ModuleNode::leaf("util", vec![]));
        let mut storage = ModuleNode::leaf("storage", vec![]);
        storage
            .children
            .insert("util".into(), ModuleNode::leaf("util", vec![]));
        root.children.insert("api".into(), api);
        root.children.insert("storage".into(), storage);

        assert_eq!(artifact_name(&root, &["api".into()]), "api.md");
        assert_eq!(
            artifact_name(&root, &["api".into(), "util".into()]),
            "api.util.md"
        );
        assert_eq!(
            artifact_name(&root, &["storage".into(), "util".into()]),
            "storage.util.md"
        );
        assert_eq!(artifact_name(&root, &[]), "repo.md");
    }

    #[tokio::test]
    async fn existing_artifact_short_circuits_without_model_calls() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join("core.md"), "# core\n").unwrap();
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let ctx = context(backend.clone(), temp.path().to_path_buf());

        let artifact = document_module(&ctx, vec!["core".into()], 0).await.unwrap();
        assert_eq!(artifact, temp.path().join("core.md"));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn agent_creates_artifact_through_the_editor() {
        let temp = tempfile::TempDir::new().unwrap();
        let docs = temp.path().to_path_buf();
        let create_args = serde_json::json!({
            "command": "create",
            "path": docs.join("core.md").to_string_lossy(),
            "file_text": "# core\n\nDocumentation.\n",
        })
        .to_string();
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ScriptedBackend::tool_call_response("str_replace_editor", &create_args)),
            Ok(ScriptedBackend::text_response("Done.")),
        ]));
        let ctx = context(backend, docs.clone());

        let artifact = document_module(&ctx, vec!["core".into()], 0).await.unwrap();
        assert!(artifact.exists());
        assert_eq!(fs::read_to_string(artifact).unwrap(), "# core\n\nDocumentation.\n");
    }

    #[tokio::test]
    async fn finishing_without_artifact_is_a_give_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            ScriptedBackend::text_response("I could not do it."),
        )]));
        let ctx = context(backend, temp.path().to_path_buf());

        let err = document_module(&ctx, vec!["core".into()], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::GaveUp { .. }));
    }

    #[tokio::test]
    async fn chain_exhaustion_aborts_the_invocation() {
        let temp = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(vec![Err(LlmError::Transport(
            "down".into(),
        ))]));
        let ctx = context(backend, temp.path().to_path_buf());

        let err = document_module(&ctx, vec!["core".into()], 0)
            .await
            .unwrap_err();
        match err {
            AgentError::Model { module, source } => {
                assert_eq!(module, "core");
                assert!(matches!(source, LlmError::ChainExhausted(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn stringified_array_arguments_are_repaired_before_decoding() {
        let temp = tempfile::TempDir::new().unwrap();
        let docs = temp.path().to_path_buf();
        // component_ids arrives as a JSON-encoded string, as some providers send it
        let bad_args = r#"{"component_ids": "[\"a.f\"]"}"#;
        let create_args = serde_json::json!({
            "command": "create",
            "path": docs.join("core.md").to_string_lossy(),
            "file_text": "# core\n",
        })
        .to_string();
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ScriptedBackend::tool_call_response("read_code_components", bad_args)),
            Ok(ScriptedBackend::tool_call_response("str_replace_editor", &create_args)),
            Ok(ScriptedBackend::text_response("Done.")),
        ]));
        let ctx = context(backend.clone(), docs);

        document_module(&ctx, vec!["core".into()], 0).await.unwrap();

        // the second request carries the tool result for the repaired call:
        // real source, not a decode error
        let requests = backend.requests.lock().unwrap();
        let tool_result = requests[1]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "tool")
            .and_then(|m| m.content.clone())
            .unwrap();
        assert!(tool_result.contains("# a.f ("));
        assert!(!tool_result.starts_with("Error"));
    }
}
