// orchestrate.rs
// End-to-end pipeline: extract -> graph -> cluster -> document -> overviews.
// The documentation walk is depth-first post-order (children complete before
// their parent), the repository overview is strictly last, and any agent
// failure aborts the run naming the module. Artifacts already on disk are
// skipped, which is the resume mechanism.

use crate::agent::{self, context::AgentContext};
use crate::cluster;
use crate::config::Config;
use crate::error::PipelineError;
use crate::extract;
use crate::graph::{self, cycles, leaves};
use crate::llm::{complete_text, ChatBackend, FallbackChain};
use crate::model::{ComponentRegistry, ModuleNode, Repository};
use crate::prompts;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const OVERVIEW_FILENAME: &str = "overview.md";
pub const MODULE_TREE_FILENAME: &str = "module_tree.json";
pub const METADATA_FILENAME: &str = "metadata.json";

/// Run the whole pipeline over the configured repository.
pub async fn run_pipeline(
    config: &Config,
    backend: Arc<dyn ChatBackend>,
) -> Result<(), PipelineError> {
    fs::create_dir_all(&config.output_dir)?;
    let repository = Repository {
        url: String::new(),
        name: config.repository_name(),
        root: config.repository_root.to_string_lossy().to_string(),
        analysis_id: sanitize(&config.repository_name()),
    };

    // Stage 1: extraction and graph build.
    let extraction = extract::extract_repository(
        &config.repository_root,
        &config.include_patterns,
        &config.exclude_patterns,
    );
    let mut registry = extraction.registry;
    let (dependency_graph, _edges) = graph::build_graph(&mut registry, extraction.edges);

    let graph_file = config
        .output_dir
        .join(format!("{}_dependency_graph.json", repository.analysis_id));
    graph::save_registry(&registry, &graph_file)?;

    let order = cycles::topological_sort(&dependency_graph);
    debug!("topological order covers {} components", order.len());

    let leaf_ids = leaves::leaf_ids(&dependency_graph, &registry, extraction.has_go);
    info!("{} leaf components after filtering", leaf_ids.len());

    // Boundary: nothing documentable, emit a degenerate overview and stop.
    if leaf_ids.is_empty() {
        let overview = config.output_dir.join(OVERVIEW_FILENAME);
        fs::write(
            &overview,
            format!(
                "# {}\n\nNo documentable components were found in this repository.\n",
                config.repository_name()
            ),
        )?;
        write_metadata(config, &repository, &registry, 0, extraction.files_analyzed)?;
        return Ok(());
    }

    // Stage 2: clustering. A tree saved by a previous run is reused so a
    // resumed run partitions identically.
    let tree_file = config.output_dir.join(MODULE_TREE_FILENAME);
    let module_tree = match fs::read_to_string(&tree_file)
        .ok()
        .and_then(|json| serde_json::from_str::<ModuleNode>(&json).ok())
    {
        Some(cached) => {
            info!("reusing module tree from {:?}", tree_file);
            cached
        }
        None => {
            let tree = cluster::cluster(&registry, &leaf_ids, config, backend.as_ref()).await;
            fs::write(&tree_file, serde_json::to_string_pretty(&tree)?)?;
            tree
        }
    };

    // Stage 3: documentation, leaf-first.
    let registry = Arc::new(registry);
    let tree = Arc::new(module_tree);
    let ctx = AgentContext::new(config, registry.clone(), tree.clone(), backend.clone());
    document_tree(config, &ctx, &tree).await?;

    // Stage 4: metadata.
    write_metadata(config, &repository, &registry, leaf_ids.len(), extraction.files_analyzed)?;
    info!("documentation complete in {:?}", config.output_dir);
    Ok(())
}

/// Post-order walk: leaves get the agent, parents get overview synthesis
/// after all their children exist, the root overview comes last.
pub async fn document_tree(
    config: &Config,
    ctx: &AgentContext,
    tree: &ModuleNode,
) -> Result<(), PipelineError> {
    for path in tree.post_order_paths() {
        let Some(node) = tree.descend(&path) else {
            warn!("module path {:?} vanished from the tree, skipping", path);
            continue;
        };
        let label = if path.is_empty() {
            tree.name.clone()
        } else {
            path.join("/")
        };

        if path.is_empty() {
            // Root last: a leaf root means the whole repository fit in one
            // module; its artifact becomes the overview.
            let overview = config.output_dir.join(OVERVIEW_FILENAME);
            if overview.exists() {
                info!("skipping repository overview (artifact already exists)");
                continue;
            }
            if node.is_leaf() {
                let artifact = agent::document_module(ctx, Vec::new(), 0)
                    .await
                    .map_err(|e| PipelineError::Module {
                        module: label.clone(),
                        source: e,
                    })?;
                fs::rename(&artifact, &overview)?;
            } else {
                synthesize_overview(config, ctx, tree, &path, &overview).await?;
            }
            continue;
        }

        if node.is_leaf() {
            info!("documenting leaf module {}", label);
            agent::document_module(ctx, path.clone(), 0)
                .await
                .map_err(|e| PipelineError::Module {
                    module: label.clone(),
                    source: e,
                })?;
        } else {
            let artifact = agent::artifact_path(ctx, &path);
            if artifact.exists() {
                info!("skipping module overview {} (artifact already exists)", label);
                continue;
            }
            info!("synthesizing overview for parent module {}", label);
            synthesize_overview(config, ctx, tree, &path, &artifact).await?;
        }
    }
    Ok(())
}

/// Parent and repository overviews are direct model calls, not agents: the
/// children's finished artifacts plus an overview prompt, the response
/// unwrapped from its <OVERVIEW> tags and written to disk.
async fn synthesize_overview(
    config: &Config,
    ctx: &AgentContext,
    tree: &ModuleNode,
    path: &[String],
    artifact: &Path,
) -> Result<(), PipelineError> {
    let module_name = path.last().cloned().unwrap_or_else(|| tree.name.clone());
    let structure = overview_structure(ctx, tree, path);
    let structure_json = serde_json::to_string_pretty(&structure)?;

    let prompt = if path.is_empty() {
        prompts::repo_overview_prompt(&tree.name, &structure_json)
    } else {
        prompts::module_overview_prompt(&module_name, &structure_json)
    };

    let chain = FallbackChain::new(ctx.model_chain.clone());
    let response = complete_text(
        ctx.backend.as_ref(),
        &chain,
        &prompt,
        config.budgets.max_output_tokens,
    )
    .await?;

    let content = extract_overview(&response).ok_or_else(|| PipelineError::Overview {
        module: module_name.clone(),
        reason: "response missing <OVERVIEW> tags".into(),
    })?;
    fs::write(artifact, content)?;
    Ok(())
}

fn extract_overview(response: &str) -> Option<String> {
    let start = response.find("<OVERVIEW>")? + "<OVERVIEW>".len();
    let end = response.find("</OVERVIEW>")?;
    let body = response.get(start..end)?.trim();
    Some(format!("{}\n", body))
}

/// JSON rendering of the tree handed to overview prompts: the target module
/// marked, and its direct children carrying their finished documentation.
fn overview_structure(ctx: &AgentContext, tree: &ModuleNode, path: &[String]) -> Value {
    fn render(
        ctx: &AgentContext,
        node: &ModuleNode,
        node_path: &[String],
        target: &[String],
    ) -> Value {
        let mut out = json!({
            "name": node.name,
            "components": node.components,
        });
        if node_path == target {
            out["is_target_for_overview_generation"] = json!(true);
        }
        // direct children of the target carry their artifact text
        if node_path.len() == target.len() + 1 && node_path.starts_with(target) {
            let artifact = agent::artifact_path(ctx, node_path);
            match fs::read_to_string(&artifact) {
                Ok(docs) => out["docs"] = json!(docs),
                Err(_) => {
                    warn!("module docs not found at {:?}", artifact);
                    out["docs"] = json!("");
                }
            }
        }
        if !node.children.is_empty() {
            let mut children = serde_json::Map::new();
            for (name, child) in &node.children {
                let mut child_path = node_path.to_vec();
                child_path.push(name.clone());
                children.insert(name.clone(), render(ctx, child, &child_path, target));
            }
            out["children"] = Value::Object(children);
        }
        out
    }
    render(ctx, tree, &[], path)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Commit id of the analyzed repository, when it is a git checkout.
fn commit_id(repo_root: &Path) -> Option<String> {
    let head = fs::read_to_string(repo_root.join(".git/HEAD")).ok()?;
    let head = head.trim();
    match head.strip_prefix("ref: ") {
        Some(reference) => {
            let value = fs::read_to_string(repo_root.join(".git").join(reference)).ok()?;
            Some(value.trim().to_string())
        }
        None => Some(head.to_string()),
    }
}

fn write_metadata(
    config: &Config,
    repository: &Repository,
    registry: &ComponentRegistry,
    leaf_count: usize,
    files_analyzed: usize,
) -> Result<(), PipelineError> {
    let mut files: Vec<String> = fs::read_dir(&config.output_dir)?
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            (name.ends_with(".md") || name.ends_with(".json")).then_some(name)
        })
        .collect();
    files.sort();

    let metadata = json!({
        "generation_info": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "main_model": config.main_model,
            "generator_version": env!("CARGO_PKG_VERSION"),
            "repository": repository,
            "commit_id": commit_id(&config.repository_root),
        },
        "statistics": {
            "total_components": registry.len(),
            "leaf_components": leaf_count,
            "max_depth": config.budgets.max_recursion_depth,
            "files_analyzed": files_analyzed,
        },
        "files_generated": files,
    });
    fs::write(
        config.output_dir.join(METADATA_FILENAME),
        serde_json::to_string_pretty(&metadata)?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_tags_are_unwrapped() {
        let response = "thinking...\n<OVERVIEW>\n# Repo\n\nBody.\n</OVERVIEW>\ndone";
        assert_eq!(extract_overview(response).unwrap(), "# Repo\n\nBody.\n");
        assert!(extract_overview("no tags").is_none());
    }

    #[test]
    fn sanitize_keeps_alphanumerics() {
        assert_eq!(sanitize("my-repo.v2"), "my_repo_v2");
    }
}
