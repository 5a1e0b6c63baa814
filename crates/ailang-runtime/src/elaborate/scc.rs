//! Strongly connected components over top-level binding names
//!
//! Tarjan's algorithm. Components pop in dependency-first order: every
//! edge out of a popped component points into an earlier one, which is
//! exactly the order binding groups must be emitted in.

use std::collections::{BTreeSet, HashMap};

struct TarjanState<'a> {
    edges: &'a HashMap<String, BTreeSet<String>>,
    index: HashMap<String, usize>,
    lowlink: HashMap<String, usize>,
    on_stack: BTreeSet<String>,
    stack: Vec<String>,
    next_index: usize,
    components: Vec<Vec<String>>,
}

/// Compute SCCs of the graph restricted to `nodes`. Edges to nodes
/// outside the set are ignored. Returns components dependency-first;
/// nodes within a component keep their `nodes` order.
pub fn strongly_connected_components(
    nodes: &[String],
    edges: &HashMap<String, BTreeSet<String>>,
) -> Vec<Vec<String>> {
    let mut state = TarjanState {
        edges,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: BTreeSet::new(),
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };

    for node in nodes {
        if !state.index.contains_key(node) {
            visit(node, nodes, &mut state);
        }
    }

    // Restore declaration order within each component
    for component in &mut state.components {
        component.sort_by_key(|n| nodes.iter().position(|x| x == n));
    }
    state.components
}

fn visit(node: &str, nodes: &[String], state: &mut TarjanState<'_>) {
    state.index.insert(node.to_string(), state.next_index);
    state.lowlink.insert(node.to_string(), state.next_index);
    state.next_index += 1;
    state.stack.push(node.to_string());
    state.on_stack.insert(node.to_string());

    if let Some(successors) = state.edges.get(node) {
        let successors: Vec<String> = successors
            .iter()
            .filter(|s| nodes.contains(s))
            .cloned()
            .collect();
        for succ in successors {
            if !state.index.contains_key(&succ) {
                visit(&succ, nodes, state);
                let succ_low = state.lowlink[&succ];
                let entry = state.lowlink.get_mut(node).expect("visited");
                *entry = (*entry).min(succ_low);
            } else if state.on_stack.contains(&succ) {
                let succ_index = state.index[&succ];
                let entry = state.lowlink.get_mut(node).expect("visited");
                *entry = (*entry).min(succ_index);
            }
        }
    }

    if state.lowlink[node] == state.index[node] {
        let mut component = Vec::new();
        while let Some(top) = state.stack.pop() {
            state.on_stack.remove(&top);
            let done = top == node;
            component.push(top);
            if done {
                break;
            }
        }
        state.components.push(component);
    }
}

/// Whether a singleton component is self-recursive
pub fn is_self_recursive(name: &str, edges: &HashMap<String, BTreeSet<String>>) -> bool {
    edges.get(name).is_some_and(|succs| succs.contains(name))
}
