// graph/mod.rs
// Dependency graph assembly: edge resolution against the registry,
// deduplication, adjacency construction, and the JSON artifact.

pub mod cycles;
pub mod leaves;

use crate::model::{CallEdge, ComponentRegistry, DependencyGraph};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Resolve edges against the registry, deduplicate, populate `depends_on`,
/// and build the adjacency map. Unresolved edges are retained in the returned
/// vector (with `resolved == false`) for diagnostics; they never reach
/// `depends_on`.
pub fn build_graph(
    registry: &mut ComponentRegistry,
    edges: Vec<CallEdge>,
) -> (DependencyGraph, Vec<CallEdge>) {
    let edges = resolve_edges(registry, edges);
    let edges = deduplicate(edges);

    for edge in &edges {
        if !edge.resolved || edge.caller == edge.callee {
            continue;
        }
        if let Some(component) = registry.get_mut(&edge.caller) {
            component.depends_on.insert(edge.callee.clone());
        }
    }

    let mut graph = DependencyGraph::new();
    for (id, component) in registry.iter() {
        let deps: BTreeSet<String> = component
            .depends_on
            .iter()
            .filter(|dep| registry.contains_key(*dep))
            .cloned()
            .collect();
        graph.insert(id.clone(), deps);
    }

    let resolved = edges.iter().filter(|e| e.resolved).count();
    info!(
        "graph: {} nodes, {} resolved edges, {} unresolved",
        graph.len(),
        resolved,
        edges.len() - resolved
    );
    (graph, edges)
}

/// Resolution order: (1) direct id match, (2) `Class.method` match, then
/// (3) unqualified-name match against the registry. Ambiguous names resolve
/// to the lexicographically first id so repeated runs agree.
fn resolve_edges(registry: &ComponentRegistry, mut edges: Vec<CallEdge>) -> Vec<CallEdge> {
    let mut by_name: HashMap<&str, &str> = HashMap::new();
    let mut by_member: HashMap<String, &str> = HashMap::new();
    for (id, component) in registry.iter() {
        by_name.entry(component.name.as_str()).or_insert(id.as_str());
        if let Some(class) = &component.enclosing_class {
            by_member
                .entry(format!("{}.{}", class, component.name))
                .or_insert(id.as_str());
        }
    }

    for edge in &mut edges {
        if registry.contains_key(&edge.callee) {
            edge.resolved = true;
            continue;
        }
        if let Some(id) = by_member.get(&edge.callee) {
            edge.callee = id.to_string();
            edge.resolved = true;
            continue;
        }
        let short = edge.callee.rsplit('.').next().unwrap_or(&edge.callee);
        if let Some(id) = by_name.get(short) {
            edge.callee = id.to_string();
            edge.resolved = true;
            continue;
        }
        debug!("unresolved edge {} -> {}", edge.caller, edge.callee);
    }
    edges
}

/// Collapse duplicate `(caller, callee, kind)` triples, keeping the first
/// occurrence so ordering stays stable.
fn deduplicate(edges: Vec<CallEdge>) -> Vec<CallEdge> {
    let mut seen = BTreeSet::new();
    let mut unique = Vec::with_capacity(edges.len());
    for edge in edges {
        let key = (edge.caller.clone(), edge.callee.clone(), edge.kind);
        if seen.insert(key) {
            unique.push(edge);
        }
    }
    unique
}

/// Serialize the registry (each component with its `depends_on` as an array)
/// to the dependency-graph JSON artifact.
pub fn save_registry(registry: &ComponentRegistry, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(registry)?;
    std::fs::write(path, json)
}

pub fn load_registry(path: &Path) -> std::io::Result<ComponentRegistry> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::{Component, ComponentKind, ComponentRegistry};

    pub fn component(id: &str, name: &str, kind: ComponentKind) -> Component {
        Component {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            file_path: format!("/repo/{}.py", id.split('.').next().unwrap()),
            relative_path: format!("{}.py", id.split('.').next().unwrap()),
            start_line: 1,
            end_line: 3,
            source_code: Some("def x():\n    pass\n".to_string()),
            has_doc: false,
            docstring: String::new(),
            parameters: None,
            base_types: None,
            enclosing_class: None,
            depends_on: Default::default(),
            attributes: Default::default(),
        }
    }

    pub fn registry_of(items: &[(&str, &str, ComponentKind)]) -> ComponentRegistry {
        items
            .iter()
            .map(|(id, name, kind)| (id.to_string(), component(id, name, kind.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::registry_of;
    use super::*;
    use crate::model::{ComponentKind, EdgeKind};

    #[test]
    fn resolves_by_unqualified_name() {
        let mut registry = registry_of(&[
            ("a.f", "f", ComponentKind::Function),
            ("b.g", "g", ComponentKind::Function),
        ]);
        let edges = vec![CallEdge::new("a.f", "g", EdgeKind::Calls)];
        let (graph, edges) = build_graph(&mut registry, edges);

        assert!(edges[0].resolved);
        assert_eq!(edges[0].callee, "b.g");
        assert!(graph["a.f"].contains("b.g"));
        assert!(graph["b.g"].is_empty());
    }

    #[test]
    fn member_names_resolve_before_short_names() {
        let mut registry = registry_of(&[
            ("m.Service", "Service", ComponentKind::Class),
            ("m.Service.stop", "stop", ComponentKind::Method),
            ("m.other.stop", "stop", ComponentKind::Function),
        ]);
        registry.get_mut("m.Service.stop").unwrap().enclosing_class = Some("Service".into());

        let edges = vec![CallEdge::new("m.Service", "Service.stop", EdgeKind::Calls)];
        let (_, edges) = build_graph(&mut registry, edges);
        assert!(edges[0].resolved);
        assert_eq!(edges[0].callee, "m.Service.stop");
    }

    #[test]
    fn unresolved_edges_are_kept_but_never_populate_depends_on() {
        let mut registry = registry_of(&[("a.f", "f", ComponentKind::Function)]);
        let edges = vec![CallEdge::new("a.f", "missing_fn", EdgeKind::Calls)];
        let (graph, edges) = build_graph(&mut registry, edges);

        assert_eq!(edges.len(), 1);
        assert!(!edges[0].resolved);
        assert!(graph["a.f"].is_empty());
    }

    #[test]
    fn duplicate_triples_collapse_keeping_first() {
        let mut registry = registry_of(&[
            ("a.f", "f", ComponentKind::Function),
            ("b.g", "g", ComponentKind::Function),
        ]);
        let edges = vec![
            CallEdge::new("a.f", "g", EdgeKind::Calls).at_line(2),
            CallEdge::new("a.f", "g", EdgeKind::Calls).at_line(9),
            CallEdge::new("a.f", "g", EdgeKind::References),
        ];
        let (_, edges) = build_graph(&mut registry, edges);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].line, Some(2));
    }

    #[test]
    fn self_edges_never_become_dependencies() {
        let mut registry = registry_of(&[("a.f", "f", ComponentKind::Function)]);
        let edges = vec![CallEdge::new("a.f", "a.f", EdgeKind::Calls)];
        let (graph, _) = build_graph(&mut registry, edges);
        assert!(graph["a.f"].is_empty());
    }

    #[test]
    fn registry_round_trips_through_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut registry = registry_of(&[
            ("a.f", "f", ComponentKind::Function),
            ("b.g", "g", ComponentKind::Function),
        ]);
        let edges = vec![CallEdge::new("a.f", "g", EdgeKind::Calls)];
        build_graph(&mut registry, edges);

        let path = temp.path().join("graph.json");
        save_registry(&registry, &path).unwrap();
        let loaded = load_registry(&path).unwrap();

        assert_eq!(loaded.len(), registry.len());
        assert_eq!(loaded["a.f"].depends_on, registry["a.f"].depends_on);
        assert_eq!(loaded["a.f"].kind, registry["a.f"].kind);
    }
}
