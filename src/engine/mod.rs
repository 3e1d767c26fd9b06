//! The transaction dependency engine: owns the Store, the unexecuted
//! graph, the trust/ban registry and the readiness evaluator, and exposes
//! the ingestion operations, trust/ban operations, chain-tip tracking and
//! unspent index as one cohesive API.
//!
//! `Engine` is deliberately `!Sync`: it owns a `rusqlite::Connection`
//! inside its `Store`, and the concurrency model is single-threaded
//! cooperative over exactly this state. Callers that need concurrent
//! access serialize through their own mutex or actor rather than sharing
//! unsynchronized references.

mod chain_tip;
mod ingest;
mod trust_ops;
mod unspent;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::EngineResult;
use crate::events::EventSink;
use crate::graph::UnexecutedGraph;
use crate::readiness::{ready, Readiness};
use crate::store::{self, Store};
use crate::trust::TrustBanRegistry;
use crate::types::Txid;

pub struct Engine {
    store: Store,
    graph: UnexecutedGraph,
    trust: TrustBanRegistry,
    readiness: Readiness,
    sink: Box<dyn EventSink>,
}

impl Engine {
    pub fn open(path: &str, config: &Config, sink: Box<dyn EventSink>) -> EngineResult<Self> {
        let store = Store::open(path, &config.store)?;
        Self::from_store(store, config, sink)
    }

    pub fn open_in_memory(config: &Config, sink: Box<dyn EventSink>) -> EngineResult<Self> {
        let store = Store::open_in_memory(&config.store)?;
        Self::from_store(store, config, sink)
    }

    fn from_store(store: Store, config: &Config, sink: Box<dyn EventSink>) -> EngineResult<Self> {
        if config.trust.seed_default_trust && !config.trust.default_trust_seed.is_empty() {
            let seed: Vec<Txid> = config
                .trust
                .default_trust_seed
                .iter()
                .filter_map(|hex| hex.parse().ok())
                .collect();
            store::seed_default_trust(store.conn(), &seed)?;
        }

        let trust = TrustBanRegistry::load(store.conn())?;
        let graph = Self::rebuild_graph(&store, &trust)?;
        let mut readiness = Readiness::new();
        readiness.recount(&graph);

        info!(nodes = graph.node_count(), edges = graph.edge_count(), "rebuilt unexecuted graph");

        Ok(Engine {
            store,
            graph,
            trust,
            readiness,
            sink,
        })
    }

    /// Rebuild the in-memory graph from the persisted `(executable=1 AND
    /// executed=0) OR bytes IS NULL` condition, materializing only edges
    /// whose both endpoints are in that candidate set, then fixed-point
    /// the `queued_for_execution` flags (no events fire for this — it is
    /// recomputing known state, not reacting to anything new).
    fn rebuild_graph(store: &Store, trust: &TrustBanRegistry) -> EngineResult<UnexecutedGraph> {
        let mut graph = UnexecutedGraph::new();
        let candidates = store::get_unexecuted_candidates(store.conn())?;

        for record in &candidates {
            graph.ensure_node(record.txid);
            let node = graph.get_mut(&record.txid).unwrap();
            node.downloaded = record.bytes.is_some();
            node.has_code = record.has_code;
        }

        for record in &candidates {
            for up in store::get_upstream(store.conn(), &record.txid)? {
                if graph.contains(&up) {
                    graph.add_edge(&up, &record.txid);
                }
            }
        }

        loop {
            let mut changed = false;
            let txids: Vec<Txid> = graph.txids().copied().collect();
            for txid in txids {
                let want = ready(&graph, trust, &txid);
                let node = graph.get_mut(&txid).unwrap();
                if node.queued_for_execution != want {
                    node.queued_for_execution = want;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Ok(graph)
    }

    /// Recompute `ready(txid)` (or force it) and propagate downstream,
    /// firing events through the engine's sink.
    pub(super) fn check_executability(&mut self, txid: &Txid, forced: Option<bool>) {
        self.readiness
            .check_executability(&mut self.graph, &self.trust, self.sink.as_ref(), txid, forced);
    }

    /// Recompute readiness for `txid` and, if its flag was already true
    /// both before and after, separately check whether it just became a
    /// ready root — covers `storeExecuted`/`setExecutionFailed` removing
    /// an upstream neighbour that was itself already queued for
    /// execution, which can hand a downstream node an empty upstream set
    /// without flipping its own flag (see `readiness::Readiness`).
    pub(super) fn check_executability_and_emit_unflipped_root(&mut self, txid: &Txid) {
        let was_ready = self.graph.get(txid).map(|n| n.queued_for_execution).unwrap_or(false);
        self.check_executability(txid, None);
        let now_ready = self.graph.get(txid).map(|n| n.queued_for_execution).unwrap_or(false);
        if was_ready && now_ready {
            self.readiness.emit_if_ready_root(&self.graph, self.sink.as_ref(), txid);
        }
    }

    pub fn num_queued_for_execution(&self) -> usize {
        self.readiness.num_queued()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    #[cfg(debug_assertions)]
    fn assert_invariants(&self) {
        self.readiness.debug_assert_consistent(&self.graph);
        for txid in self.graph.txids() {
            for up in self.graph.upstream(txid) {
                debug_assert!(
                    self.graph.downstream(&up).contains(txid),
                    "asymmetric edge {up} -> {txid}"
                );
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn assert_invariants(&self) {}
}

pub(crate) fn log_applied(op: &str, txid: &Txid) {
    debug!(%txid, op, "ingestion operation applied");
}
