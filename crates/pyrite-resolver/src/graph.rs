//! Resolved dependency graph and deterministic topological ordering.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use pyrite_core::marker::Marker;
use pyrite_core::version::Version;

/// A node in the resolved dependency graph.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub name: String,
    pub version: Version,
    /// Effective install condition (union of the reaching paths' markers).
    pub marker: Marker,
}

/// A resolved dependency graph backed by petgraph. Edges point from a
/// dependent to its dependency.
pub struct ResolvedGraph {
    graph: DiGraph<ResolvedNode, ()>,
    /// Lookup from canonical name to node index.
    index: HashMap<String, NodeIndex>,
}

impl ResolvedGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Add or retrieve a node. Names are unique; re-adding returns the
    /// existing index.
    pub fn add_node(&mut self, node: ResolvedNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.name) {
            return idx;
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        idx
    }

    /// Add a dependent → dependency edge (idempotent).
    pub fn add_edge(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        if !self
            .graph
            .edges(dependent)
            .any(|e| e.target() == dependency)
        {
            self.graph.add_edge(dependent, dependency, ());
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &ResolvedNode {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct dependencies of a node.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect()
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.source())
            .collect()
    }

    /// Deterministic dependency-first ordering: every dependency appears
    /// no later than its dependents, equal-priority ties broken by
    /// ascending package name. Cycles (possible through conditional
    /// edges) are cut at the lexicographically smallest remaining node.
    pub fn topo_order(&self) -> Vec<&ResolvedNode> {
        // Kahn's algorithm over out-degrees: a node with no unemitted
        // dependencies is ready.
        let mut pending: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.dependencies_of(idx).len()))
            .collect();

        let mut ready: BTreeSet<(String, NodeIndex)> = pending
            .iter()
            .filter(|(_, &deps)| deps == 0)
            .map(|(&idx, _)| (self.graph[idx].name.clone(), idx))
            .collect();
        let mut remaining: BTreeSet<(String, NodeIndex)> = pending
            .iter()
            .filter(|(_, &deps)| deps > 0)
            .map(|(&idx, _)| (self.graph[idx].name.clone(), idx))
            .collect();

        let mut order = Vec::with_capacity(pending.len());
        while order.len() < pending.len() {
            let (name, idx) = match ready.iter().next().cloned() {
                Some(entry) => entry,
                // Cycle: emit the smallest-named remaining node.
                None => match remaining.iter().next().cloned() {
                    Some(entry) => entry,
                    None => break,
                },
            };
            ready.remove(&(name.clone(), idx));
            remaining.remove(&(name, idx));
            order.push(idx);

            for dependent in self.dependents_of(idx) {
                if let Some(count) = pending.get_mut(&dependent) {
                    if *count > 0 {
                        *count -= 1;
                        if *count == 0 {
                            let entry = (self.graph[dependent].name.clone(), dependent);
                            if remaining.remove(&entry) {
                                ready.insert(entry);
                            }
                        }
                    }
                }
            }
        }

        order.iter().map(|&idx| &self.graph[idx]).collect()
    }
}

impl Default for ResolvedGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, version: &str) -> ResolvedNode {
        ResolvedNode {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            marker: Marker::Any,
        }
    }

    #[test]
    fn add_and_find() {
        let mut g = ResolvedGraph::new();
        let idx = g.add_node(node("requests", "2.18.4"));
        assert_eq!(g.find("requests"), Some(idx));
        assert_eq!(g.node(idx).version, Version::parse("2.18.4").unwrap());
    }

    #[test]
    fn duplicate_add_returns_same_index() {
        let mut g = ResolvedGraph::new();
        let a = g.add_node(node("requests", "2.18.4"));
        let b = g.add_node(node("requests", "2.18.4"));
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let mut g = ResolvedGraph::new();
        let requests = g.add_node(node("requests", "2.18.4"));
        let idna = g.add_node(node("idna", "2.6"));
        let chardet = g.add_node(node("chardet", "3.0.4"));
        g.add_edge(requests, idna);
        g.add_edge(requests, chardet);

        let order: Vec<&str> = g.topo_order().iter().map(|n| n.name.as_str()).collect();
        let pos = |name: &str| order.iter().position(|&n| n == name).unwrap();
        assert!(pos("idna") < pos("requests"));
        assert!(pos("chardet") < pos("requests"));
    }

    #[test]
    fn ties_break_by_name() {
        let mut g = ResolvedGraph::new();
        g.add_node(node("zebra", "1.0"));
        g.add_node(node("alpha", "1.0"));
        g.add_node(node("mid", "1.0"));

        let order: Vec<&str> = g.topo_order().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["alpha", "mid", "zebra"]);
    }

    #[test]
    fn cycle_is_cut_deterministically() {
        let mut g = ResolvedGraph::new();
        let a = g.add_node(node("aaa", "1.0"));
        let b = g.add_node(node("bbb", "1.0"));
        g.add_edge(a, b);
        g.add_edge(b, a);

        let order: Vec<&str> = g.topo_order().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], "aaa");
    }

    #[test]
    fn deep_chain_ordering() {
        let mut g = ResolvedGraph::new();
        let top = g.add_node(node("top", "1.0"));
        let mid = g.add_node(node("mid", "1.0"));
        let leaf = g.add_node(node("leaf", "1.0"));
        g.add_edge(top, mid);
        g.add_edge(mid, leaf);

        let order: Vec<&str> = g.topo_order().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["leaf", "mid", "top"]);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut g = ResolvedGraph::new();
        let a = g.add_node(node("a", "1.0"));
        let b = g.add_node(node("b", "1.0"));
        g.add_edge(a, b);
        g.add_edge(a, b);
        assert_eq!(g.dependencies_of(a).len(), 1);
    }
}
