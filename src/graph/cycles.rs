// graph/cycles.rs
// Cycle handling: Tarjan strongly-connected components, deterministic cycle
// resolution by edge removal, and Kahn topological sort with a logged
// fallback. Cycles are an expected condition here, not an error.

use crate::model::DependencyGraph;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{info, warn};

/// Tarjan's algorithm, iterative. Returns only SCCs of size > 1: a
/// self-referential component (`A depends on A`) is an SCC of size 1 and is
/// not reported as a cycle.
pub fn detect_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let nodes: Vec<&String> = graph.keys().collect();
    let index_of: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut index = vec![usize::MAX; nodes.len()];
    let mut lowlink = vec![0usize; nodes.len()];
    let mut on_stack = vec![false; nodes.len()];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0usize;
    let mut sccs = Vec::new();

    // Explicit call stack: (node, iterator position over its successors).
    for start in 0..nodes.len() {
        if index[start] != usize::MAX {
            continue;
        }
        let mut call_stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(&mut (v, ref mut next)) = call_stack.last_mut() {
            if *next == 0 {
                index[v] = counter;
                lowlink[v] = counter;
                counter += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            let successors: Vec<usize> = graph[nodes[v]]
                .iter()
                .filter_map(|d| index_of.get(d.as_str()).copied())
                .collect();

            if *next < successors.len() {
                let w = successors[*next];
                *next += 1;
                if index[w] == usize::MAX {
                    call_stack.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                call_stack.pop();
                if let Some(&(parent, _)) = call_stack.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut scc = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        scc.push(nodes[w].clone());
                        if w == v {
                            break;
                        }
                    }
                    if scc.len() > 1 {
                        scc.sort();
                        sccs.push(scc);
                    }
                }
            }
        }
    }
    sccs.sort();
    sccs
}

/// Break every cycle by removing edges until the graph is acyclic.
///
/// Per SCC, the removed edge is the lexicographically greatest
/// `(caller, callee)` pair among the SCC-internal edges, then detection runs
/// again in case the component held more than one elementary cycle. The rule
/// is stable by construction, so runs over an unchanged repository yield
/// identical graphs.
pub fn resolve_cycles(graph: &DependencyGraph) -> DependencyGraph {
    let mut resolved = graph.clone();
    loop {
        let cycles = detect_cycles(&resolved);
        if cycles.is_empty() {
            return resolved;
        }
        info!("detected {} dependency cycle(s)", cycles.len());
        for cycle in &cycles {
            let members: BTreeSet<&str> = cycle.iter().map(String::as_str).collect();
            let internal_edge = cycle
                .iter()
                .flat_map(|caller| {
                    resolved[caller]
                        .iter()
                        .filter(|callee| members.contains(callee.as_str()))
                        .map(move |callee| (caller.clone(), callee.clone()))
                })
                .max();
            if let Some((caller, callee)) = internal_edge {
                warn!("breaking cycle by removing dependency {} -> {}", caller, callee);
                if let Some(deps) = resolved.get_mut(&caller) {
                    deps.remove(&callee);
                }
            }
        }
    }
}

/// Kahn's algorithm over a cycle-resolved graph, dependencies first. If the
/// sort covers fewer nodes than the graph (an undetected cycle), fall back
/// to an arbitrary but deterministic order instead of aborting.
pub fn topological_sort(graph: &DependencyGraph) -> Vec<String> {
    let acyclic = resolve_cycles(graph);

    let mut in_degree: HashMap<&str, usize> =
        acyclic.keys().map(|n| (n.as_str(), 0)).collect();
    for deps in acyclic.values() {
        for dep in deps {
            if let Some(d) = in_degree.get_mut(dep.as_str()) {
                *d += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = acyclic
        .keys()
        .filter(|n| in_degree[n.as_str()] == 0)
        .map(String::as_str)
        .collect();
    let mut result: Vec<String> = Vec::with_capacity(acyclic.len());

    while let Some(node) = queue.pop_front() {
        result.push(node.to_string());
        for dep in &acyclic[node] {
            if let Some(d) = in_degree.get_mut(dep.as_str()) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(dep.as_str());
                }
            }
        }
    }

    if result.len() != acyclic.len() {
        warn!("topological sort incomplete, falling back to arbitrary order");
        return acyclic.keys().cloned().collect();
    }

    // dependencies first
    result.reverse();
    result
}
