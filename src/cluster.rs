// cluster.rs
// Token-budgeted hierarchical clustering. Sets that fit the module budget
// stay single leaf modules; oversize sets are partitioned by the cluster
// model and validated against the registry, recursing to the depth cap.
// Malformed model output never raises: the affected subtree becomes one leaf.

use crate::config::Config;
use crate::llm::{complete_text, ChatBackend, FallbackChain};
use crate::model::{ComponentRegistry, ModuleNode};
use crate::prompts::{cluster_prompt, format_core_components};
use crate::tokens;
use indexmap::IndexMap;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

/// Catch-all sibling for components the model omits from its partition.
const MISC_MODULE: &str = "Miscellaneous";

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    #[allow(dead_code)]
    path: Option<String>,
    #[serde(default)]
    components: Vec<String>,
}

/// Build the module tree for the filtered leaf set.
pub async fn cluster(
    registry: &ComponentRegistry,
    leaf_ids: &[String],
    config: &Config,
    backend: &dyn ChatBackend,
) -> ModuleNode {
    let chain = FallbackChain::new(vec![config.cluster_model.clone()]);
    let mut root = ModuleNode::leaf(config.repository_name(), leaf_ids.to_vec());
    let children = split(registry, leaf_ids, config, backend, &chain, None, 0).await;
    if !children.is_empty() {
        root.components.clear();
        root.children = children;
    }
    root
}

/// Partition one id set into named children. Empty result means the set
/// stays a leaf. Boxed for async recursion.
fn split<'a>(
    registry: &'a ComponentRegistry,
    ids: &'a [String],
    config: &'a Config,
    backend: &'a dyn ChatBackend,
    chain: &'a FallbackChain,
    current_module: Option<(&'a ModuleNode, &'a str)>,
    depth: usize,
) -> Pin<Box<dyn Future<Output = IndexMap<String, ModuleNode>> + Send + 'a>> {
    Box::pin(async move {
        if depth >= config.budgets.max_recursion_depth {
            return IndexMap::new();
        }

        let (listing, with_code) = format_core_components(ids, registry);
        let total_tokens = tokens::estimate(&with_code);
        if total_tokens <= config.budgets.max_tokens_per_module {
            info!(
                "set of {} components fits the module budget ({} tokens), keeping one leaf",
                ids.len(),
                total_tokens
            );
            return IndexMap::new();
        }

        let prompt = cluster_prompt(
            &listing,
            current_module.map(|(tree, _)| tree),
            current_module.map(|(_, name)| name),
        );
        let response = match complete_text(
            backend,
            chain,
            &prompt,
            config.budgets.max_output_tokens,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("clustering call failed, keeping one leaf module: {}", e);
                return IndexMap::new();
            }
        };

        let Some(groups) = parse_partition(&response) else {
            warn!(
                "clustering response malformed, keeping one leaf module: {}...",
                response.chars().take(200).collect::<String>()
            );
            return IndexMap::new();
        };

        let mut children = validate_partition(groups, ids);
        if children.len() <= 1 {
            info!("partition produced {} group(s), keeping one leaf", children.len());
            return IndexMap::new();
        }

        // Recurse into children still over budget.
        let names: Vec<String> = children.keys().cloned().collect();
        for name in names {
            let child_ids = children[&name].components.clone();
            let context = snapshot(&children);
            let grand_children = split(
                registry,
                &child_ids,
                config,
                backend,
                chain,
                Some((&context, name.as_str())),
                depth + 1,
            )
            .await;
            if !grand_children.is_empty() {
                if let Some(child) = children.get_mut(&name) {
                    child.components.clear();
                    child.children = grand_children;
                }
            }
        }
        children
    })
}

/// Extract and decode the sentinel-delimited JSON partition. `None` for any
/// structural violation.
fn parse_partition(response: &str) -> Option<IndexMap<String, RawGroup>> {
    let start = response.find("<GROUPED_COMPONENTS>")? + "<GROUPED_COMPONENTS>".len();
    let end = response.find("</GROUPED_COMPONENTS>")?;
    let body = response.get(start..end)?.trim();
    serde_json::from_str::<IndexMap<String, RawGroup>>(body).ok()
}

/// Drop ids not in the input set (warning each), let first placement win for
/// ids the model assigned twice, and gather every omitted id into a
/// synthetic Miscellaneous sibling.
fn validate_partition(
    groups: IndexMap<String, RawGroup>,
    ids: &[String],
) -> IndexMap<String, ModuleNode> {
    let known: std::collections::BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    let mut placed = std::collections::BTreeSet::new();
    let mut children: IndexMap<String, ModuleNode> = IndexMap::new();

    for (name, group) in groups {
        let mut components = Vec::new();
        for id in group.components {
            if !known.contains(id.as_str()) {
                warn!("dropping unknown component '{}' from module '{}'", id, name);
                continue;
            }
            if !placed.insert(id.clone()) {
                warn!(
                    "component '{}' placed in more than one module, keeping first placement",
                    id
                );
                continue;
            }
            components.push(id);
        }
        if components.is_empty() {
            warn!("module '{}' has no valid components, dropping it", name);
            continue;
        }
        children.insert(name.clone(), ModuleNode::leaf(name, components));
    }

    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !placed.contains(*id))
        .cloned()
        .collect();
    if !missing.is_empty() && !children.is_empty() {
        warn!(
            "{} component(s) missing from the partition, assigning to {}",
            missing.len(),
            MISC_MODULE
        );
        match children.get_mut(MISC_MODULE) {
            Some(existing) => existing.components.extend(missing),
            None => {
                children.insert(
                    MISC_MODULE.to_string(),
                    ModuleNode::leaf(MISC_MODULE, missing),
                );
            }
        }
    }
    children
}

/// Context snapshot handed to sub-cluster prompts: the current partition
/// with each group's components, children elided.
fn snapshot(children: &IndexMap<String, ModuleNode>) -> ModuleNode {
    let mut context = ModuleNode::leaf("partition", vec![]);
    context.children = children
        .iter()
        .map(|(name, node)| {
            (
                name.clone(),
                ModuleNode::leaf(name.clone(), node.components.clone()),
            )
        })
        .collect();
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::registry_of;
    use crate::llm::test_support::ScriptedBackend;
    use crate::model::ComponentKind;
    use std::path::PathBuf;

    fn config() -> Config {
        let mut config = Config::from_env(PathBuf::from("/repo/myrepo"), PathBuf::from("/out"));
        config.budgets.max_tokens_per_module = 1; // force a split
        config
    }

    fn big_registry() -> ComponentRegistry {
        let mut registry = registry_of(&[
            ("a.f", "f", ComponentKind::Function),
            ("b.g", "g", ComponentKind::Function),
            ("c.h", "h", ComponentKind::Function),
        ]);
        for component in registry.values_mut() {
            component.source_code = Some("x".repeat(64));
        }
        registry
    }

    fn ids() -> Vec<String> {
        vec!["a.f".into(), "b.g".into(), "c.h".into()]
    }

    #[tokio::test]
    async fn under_budget_set_stays_one_leaf() {
        let registry = big_registry();
        let mut config = config();
        config.budgets.max_tokens_per_module = 1_000_000;
        let backend = ScriptedBackend::new(vec![]);

        let root = cluster(&registry, &ids(), &config, &backend).await;
        assert!(root.is_leaf());
        assert_eq!(root.name, "myrepo");
        assert_eq!(root.components, ids());
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_partition_builds_children() {
        let registry = big_registry();
        let response = r#"Reasoning...
<GROUPED_COMPONENTS>
{"api": {"path": "a", "components": ["a.f", "b.g"]}, "storage": {"path": "c", "components": ["c.h"]}}
</GROUPED_COMPONENTS>"#;
        let backend =
            ScriptedBackend::new(vec![Ok(ScriptedBackend::text_response(response))]);

        let root = cluster(&registry, &ids(), &config(), &backend).await;
        assert!(!root.is_leaf());
        assert!(root.components.is_empty());
        assert_eq!(root.children["api"].components, vec!["a.f", "b.g"]);
        assert_eq!(root.children["storage"].components, vec!["c.h"]);

        // union across the tree equals the input set
        let mut all = root.all_component_ids();
        all.sort();
        assert_eq!(all, ids());
    }

    #[tokio::test]
    async fn unknown_and_duplicate_ids_are_dropped_and_missing_collected() {
        let registry = big_registry();
        let response = r#"<GROUPED_COMPONENTS>
{"api": {"components": ["a.f", "ghost.x"]}, "extra": {"components": ["a.f", "b.g"]}}
</GROUPED_COMPONENTS>"#;
        let backend =
            ScriptedBackend::new(vec![Ok(ScriptedBackend::text_response(response))]);

        let root = cluster(&registry, &ids(), &config(), &backend).await;
        assert_eq!(root.children["api"].components, vec!["a.f"]);
        assert_eq!(root.children["extra"].components, vec!["b.g"]);
        // c.h was omitted by the model
        assert_eq!(root.children["Miscellaneous"].components, vec!["c.h"]);
    }

    #[tokio::test]
    async fn malformed_response_falls_back_to_one_leaf() {
        let registry = big_registry();
        let backend = ScriptedBackend::new(vec![Ok(ScriptedBackend::text_response(
            "no sentinel tags here",
        ))]);
        let root = cluster(&registry, &ids(), &config(), &backend).await;
        assert!(root.is_leaf());
        assert_eq!(root.components, ids());
    }

    #[tokio::test]
    async fn single_group_partition_falls_back_to_one_leaf() {
        let registry = big_registry();
        let response = r#"<GROUPED_COMPONENTS>
{"everything": {"components": ["a.f", "b.g", "c.h"]}}
</GROUPED_COMPONENTS>"#;
        let backend =
            ScriptedBackend::new(vec![Ok(ScriptedBackend::text_response(response))]);
        let root = cluster(&registry, &ids(), &config(), &backend).await;
        assert!(root.is_leaf());
    }

    #[tokio::test]
    async fn recursion_stops_at_max_depth() {
        let registry = big_registry();
        let mut config = config();
        config.budgets.max_recursion_depth = 0;
        let backend = ScriptedBackend::new(vec![]);
        let root = cluster(&registry, &ids(), &config, &backend).await;
        assert!(root.is_leaf());
        assert!(backend.requests.lock().unwrap().is_empty());
    }
}
