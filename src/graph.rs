//! The in-memory unexecuted graph: the subgraph of transactions that have
//! not finished executing, kept as a `StableGraph` so that node indices
//! survive removals across edits.

use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Direction;

use crate::types::Txid;

/// Per-node state tracked while a transaction is unexecuted. Once a
/// transaction executes (or is deleted) its node is dropped from the graph
/// entirely — the store remains the durable record.
#[derive(Debug, Clone)]
pub struct TxNode {
    pub txid: Txid,
    /// Raw bytes have been fetched and parsed.
    pub downloaded: bool,
    /// Whether the transaction's outputs carry executable code.
    /// `None` until the transaction has been downloaded and parsed.
    pub has_code: Option<bool>,
    /// Set once the readiness evaluator has handed this node to the
    /// executor; cleared on `set_execution_failed` so it can be retried.
    pub queued_for_execution: bool,
}

impl TxNode {
    pub fn new(txid: Txid) -> Self {
        TxNode {
            txid,
            downloaded: false,
            has_code: None,
            queued_for_execution: false,
        }
    }
}

type Graph = StableGraph<TxNode, ()>;

/// The unexecuted subgraph. `deps` edges point `up -> down`, matching the
/// store's `deps` table: an edge `up -> down` means `down` depends on `up`.
pub struct UnexecutedGraph {
    graph: Graph,
    index: HashMap<Txid, NodeIndex>,
}

impl UnexecutedGraph {
    pub fn new() -> Self {
        UnexecutedGraph {
            graph: StableGraph::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.index.contains_key(txid)
    }

    pub fn get(&self, txid: &Txid) -> Option<&TxNode> {
        self.index.get(txid).map(|&idx| &self.graph[idx])
    }

    pub fn get_mut(&mut self, txid: &Txid) -> Option<&mut TxNode> {
        let idx = *self.index.get(txid)?;
        Some(&mut self.graph[idx])
    }

    /// Insert a node if absent; a no-op returning the existing node
    /// otherwise. Mirrors `GraphManager::ensure_page_exists`'s
    /// get-or-create shape.
    pub fn ensure_node(&mut self, txid: Txid) -> NodeIndex {
        if let Some(&idx) = self.index.get(&txid) {
            return idx;
        }
        let idx = self.graph.add_node(TxNode::new(txid));
        self.index.insert(txid, idx);
        idx
    }

    /// Remove a node and every edge touching it. Returns the node's final
    /// state, if it was present.
    pub fn remove_node(&mut self, txid: &Txid) -> Option<TxNode> {
        let idx = self.index.remove(txid)?;
        self.graph.remove_node(idx)
    }

    /// Add a dependency edge `up -> down`. Self-edges are rejected: the
    /// readiness walk in `readiness::ready` would otherwise treat a
    /// transaction as its own unready dependency forever.
    pub fn add_edge(&mut self, up: &Txid, down: &Txid) {
        debug_assert!(up != down, "self-dependency edge {up} -> {down}");
        if up == down {
            return;
        }
        let up_idx = self.ensure_node(*up);
        let down_idx = self.ensure_node(*down);
        if !self.has_edge(up_idx, down_idx) {
            self.graph.add_edge(up_idx, down_idx, ());
        }
    }

    fn has_edge(&self, up: NodeIndex, down: NodeIndex) -> bool {
        self.graph.find_edge(up, down).is_some()
    }

    /// Direct upstream dependencies (transactions `txid` depends on).
    pub fn upstream(&self, txid: &Txid) -> Vec<Txid> {
        self.neighbors(txid, Direction::Incoming)
    }

    /// Direct downstream dependents (transactions that depend on `txid`).
    pub fn downstream(&self, txid: &Txid) -> Vec<Txid> {
        self.neighbors(txid, Direction::Outgoing)
    }

    fn neighbors(&self, txid: &Txid, direction: Direction) -> Vec<Txid> {
        let Some(&idx) = self.index.get(txid) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].txid)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All txids currently in the unexecuted graph, for diagnostics and
    /// the invariant re-derivation in `readiness`.
    pub fn txids(&self) -> impl Iterator<Item = &Txid> {
        self.index.keys()
    }
}

impl Default for UnexecutedGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(byte: u8) -> Txid {
        Txid::from_bytes([byte; 32])
    }

    #[test]
    fn ensure_node_is_idempotent() {
        let mut g = UnexecutedGraph::new();
        let a = ensure_node_idx(&mut g, txid(1));
        let b = ensure_node_idx(&mut g, txid(1));
        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);
    }

    fn ensure_node_idx(g: &mut UnexecutedGraph, t: Txid) -> NodeIndex {
        g.ensure_node(t)
    }

    #[test]
    fn edges_track_upstream_and_downstream() {
        let mut g = UnexecutedGraph::new();
        let (up, down) = (txid(1), txid(2));
        g.add_edge(&up, &down);
        assert_eq!(g.upstream(&down), vec![up]);
        assert_eq!(g.downstream(&up), vec![down]);
        assert!(g.upstream(&up).is_empty());
    }

    #[test]
    fn self_edge_is_rejected() {
        let mut g = UnexecutedGraph::new();
        let t = txid(1);
        g.add_edge(&t, &t);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn duplicate_edges_do_not_double_insert() {
        let mut g = UnexecutedGraph::new();
        let (up, down) = (txid(1), txid(2));
        g.add_edge(&up, &down);
        g.add_edge(&up, &down);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn remove_node_drops_edges() {
        let mut g = UnexecutedGraph::new();
        let (up, down) = (txid(1), txid(2));
        g.add_edge(&up, &down);
        g.remove_node(&up);
        assert!(!g.contains(&up));
        assert!(g.downstream(&up).is_empty());
        assert!(g.upstream(&down).is_empty());
    }

    #[test]
    fn node_indices_stay_stable_across_removal() {
        let mut g = UnexecutedGraph::new();
        let a = g.ensure_node(txid(1));
        let _b = g.ensure_node(txid(2));
        g.remove_node(&txid(1));
        let c = g.ensure_node(txid(3));
        assert_ne!(a, c);
        assert!(g.get(&txid(2)).is_some());
    }
}
