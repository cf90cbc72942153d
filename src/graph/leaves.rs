// graph/leaves.rs
// Leaf identification with language-aware kind filtering. Every component is
// a documentation candidate; the large-repository prune keeps only strict
// leaves (ids no other component depends on).

use crate::model::{ComponentKind, ComponentRegistry, DependencyGraph};
use crate::graph::cycles::resolve_cycles;
use std::collections::BTreeSet;
use tracing::{debug, warn};

const ERROR_LIKE: &[&str] = &["error", "exception", "failed", "invalid"];

/// Threshold above which non-Go repositories are pruned to strict leaves.
const LARGE_REPO_LEAF_LIMIT: usize = 400;

/// Kind set permitted in the leaf set for this repository.
///
/// Defaults to class-like kinds. Go repositories keep functions and methods
/// too (Go code is behavior-centric even when structs exist). Repositories
/// with no class-like kinds at all (pure C style) admit functions.
pub fn valid_leaf_kinds(registry: &ComponentRegistry, has_go: bool) -> BTreeSet<ComponentKind> {
    let mut valid: BTreeSet<ComponentKind> = [
        ComponentKind::Class,
        ComponentKind::Interface,
        ComponentKind::Struct,
    ]
    .into_iter()
    .collect();

    if has_go {
        valid.insert(ComponentKind::Function);
        valid.insert(ComponentKind::Method);
    } else {
        let has_class_like = registry
            .values()
            .any(|c| valid.contains(&c.kind));
        if !has_class_like {
            valid.insert(ComponentKind::Function);
        }
    }
    valid
}

/// Identify and filter the leaf set used for clustering and documentation.
pub fn leaf_ids(
    graph: &DependencyGraph,
    registry: &ComponentRegistry,
    has_go: bool,
) -> Vec<String> {
    let acyclic = resolve_cycles(graph);
    let valid = valid_leaf_kinds(registry, has_go);

    let mut candidates: BTreeSet<String> = acyclic.keys().cloned().collect();
    let mut kept = filter_candidates(&candidates, registry, &valid);

    if kept.len() >= LARGE_REPO_LEAF_LIMIT && !has_go {
        warn!(
            "large repository: {} leaf candidates, pruning to components nothing depends on",
            kept.len()
        );
        for deps in acyclic.values() {
            for dep in deps {
                candidates.remove(dep);
            }
        }
        kept = filter_candidates(&candidates, registry, &valid);
    } else if kept.len() >= LARGE_REPO_LEAF_LIMIT {
        debug!(
            "keeping all {} leaf candidates to preserve Go function coverage",
            kept.len()
        );
    }

    if kept.is_empty() {
        warn!("no leaf components found in the graph");
    }
    kept
}

fn filter_candidates(
    candidates: &BTreeSet<String>,
    registry: &ComponentRegistry,
    valid: &BTreeSet<ComponentKind>,
) -> Vec<String> {
    let mut kept = Vec::new();
    for id in candidates {
        if id.trim().is_empty() {
            continue;
        }
        // constructor entries fold into their class
        let id = match id.strip_suffix(".__init__") {
            Some(class_id) if registry.contains_key(class_id) => class_id,
            _ => id.as_str(),
        };
        let Some(component) = registry.get(id) else {
            debug!("leaf candidate {} not in registry, dropping", id);
            continue;
        };
        if !valid.contains(&component.kind) {
            continue;
        }
        let lower = component.name.to_lowercase();
        if ERROR_LIKE.iter().any(|kw| lower.contains(kw)) {
            continue;
        }
        if !kept.contains(&id.to_string()) {
            kept.push(id.to_string());
        }
    }
    kept
}
