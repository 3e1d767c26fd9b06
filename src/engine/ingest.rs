//! Ingestion operations. Each public method here wraps exactly one atomic
//! store transaction, updates the in-memory graph to match, then fires
//! whatever events the mutation implies — in that order, so observers
//! never see a state the store transaction hasn't committed yet.

use std::collections::HashSet;

use chrono::Utc;

use crate::error::EngineResult;
use crate::interfaces::ExecutionResult;
use crate::store;
use crate::types::{Height, Location, Txid};

use super::Engine;

impl Engine {
    /// No-op if `txid` is already known. Otherwise inserts the bare
    /// record and creates an unexecuted node with `downloaded=false,
    /// has_code=unknown`.
    pub fn add_new(&mut self, txid: &Txid, height: Option<Height>) -> EngineResult<()> {
        if store::tx_exists(self.store.conn(), txid)? {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        {
            let txn = self.store.begin()?;
            store::insert_new_tx(&txn, txid, height.unwrap_or(Height::Unknown), Some(now))?;
            txn.commit()?;
        }

        self.graph.ensure_node(*txid);
        self.check_executability(txid, None);
        self.sink.on_add_transaction(txid);
        self.assert_invariants();
        super::log_applied("add_new", txid);
        Ok(())
    }

    /// Writes bytes, marks `executable=false`, records spend attribution
    /// for `inputs` and tracks `outputs` as newly unspent. The node is
    /// marked downloaded then dropped from the unexecuted graph — there
    /// is nothing left for the executor to run — and every former
    /// downstream neighbour is re-evaluated, since an absent upstream
    /// node satisfies the readiness predicate.
    pub fn store_parsed_non_executable(
        &mut self,
        txid: &Txid,
        bytes: &[u8],
        inputs: &[Location],
        outputs: &[Location],
    ) -> EngineResult<()> {
        {
            let txn = self.store.begin()?;
            store::update_tx_bytes(&txn, txid, bytes, false)?;
            store::set_executable(&txn, txid, false)?;
            for input in inputs {
                store::set_spend(&txn, input, Some(txid))?;
            }
            for output in outputs {
                store::set_spend(&txn, output, None)?;
            }
            txn.commit()?;
        }

        let downstream = self.graph.downstream(txid);
        self.graph.remove_node(txid);
        for down in downstream {
            self.check_executability(&down, None);
        }
        self.assert_invariants();
        Ok(())
    }

    /// Writes bytes, marks `executable=true` and records `has_code`, and
    /// registers every declared dependency — all inside the one store
    /// transaction this operation owns, so a crash never leaves the
    /// record persisted as executable with its dep edges missing. Once
    /// committed: a dep still in the unexecuted graph gets its in-memory
    /// edge materialized; a dep that dropped out of the graph either
    /// finished non-executable (satisfies the upstream clause) or
    /// finished executed-but-unindexed (permanently failed upstream —
    /// `executed=1 ∧ indexed=0`), which fails `txid`'s own execution and
    /// stops processing further deps.
    #[allow(clippy::too_many_arguments)]
    pub fn store_parsed_executable(
        &mut self,
        txid: &Txid,
        bytes: &[u8],
        has_code: bool,
        deps: &[Txid],
        inputs: &[Location],
        outputs: &[Location],
    ) -> EngineResult<()> {
        let now = Utc::now().timestamp();
        let mut new_deps = Vec::new();
        {
            let txn = self.store.begin()?;
            store::update_tx_bytes(&txn, txid, bytes, has_code)?;
            store::set_executable(&txn, txid, true)?;
            for input in inputs {
                store::set_spend(&txn, input, Some(txid))?;
            }
            for output in outputs {
                store::set_spend(&txn, output, None)?;
            }
            for dep in deps {
                if !store::tx_exists(&txn, dep)? {
                    store::insert_new_tx(&txn, dep, Height::Unknown, Some(now))?;
                    new_deps.push(*dep);
                }
                store::insert_dep(&txn, dep, txid)?;
            }
            txn.commit()?;
        }
        if let Some(node) = self.graph.get_mut(txid) {
            node.downloaded = true;
            node.has_code = Some(has_code);
        }

        for dep in &new_deps {
            self.graph.ensure_node(*dep);
            self.check_executability(dep, None);
            self.sink.on_add_transaction(dep);
            super::log_applied("add_new", dep);
        }

        for dep in deps {
            if self.graph.contains(dep) {
                self.graph.add_edge(dep, txid);
            } else {
                let record = store::get_tx(self.store.conn(), dep)?;
                let permanently_failed = record.map(|r| r.executed && !r.indexed).unwrap_or(false);
                if permanently_failed {
                    self.set_execution_failed(txid)?;
                    return Ok(());
                }
            }
        }

        self.check_executability(txid, None);
        self.assert_invariants();
        Ok(())
    }

    /// Sets `executed=1, indexed=1`, writes jig/berry states and
    /// annotations from `result`, and removes the node from the graph.
    pub fn store_executed(&mut self, txid: &Txid, result: &ExecutionResult) -> EngineResult<()> {
        {
            let txn = self.store.begin()?;
            store::set_executed(&txn, txid, true)?;
            store::set_indexed(&txn, txid, true)?;
            write_execution_result(&txn, result)?;
            txn.commit()?;
        }

        let was_queued = self.graph.get(txid).map(|n| n.queued_for_execution).unwrap_or(false);
        let downstream = self.graph.downstream(txid);
        self.graph.remove_node(txid);
        if was_queued {
            self.readiness.decrement();
        }

        for down in downstream {
            self.check_executability_and_emit_unflipped_root(&down);
        }
        self.assert_invariants();
        Ok(())
    }

    /// Sets `executable=0, executed=1, indexed=0` and removes the node.
    /// Cascades recursively to every downstream neighbour only if the
    /// transaction still looked executable going into the failure — a
    /// parse failure on a transaction that never claimed to carry code
    /// shouldn't poison descendants that never depended on it executing.
    pub fn set_execution_failed(&mut self, txid: &Txid) -> EngineResult<()> {
        self.set_execution_failed_inner(txid, &mut HashSet::new())
    }

    fn set_execution_failed_inner(&mut self, txid: &Txid, visited: &mut HashSet<Txid>) -> EngineResult<()> {
        if !visited.insert(*txid) {
            return Ok(());
        }

        let was_executable = store::get_tx(self.store.conn(), txid)?.map(|r| r.executable).unwrap_or(false);

        {
            let txn = self.store.begin()?;
            store::set_executable(&txn, txid, false)?;
            store::set_executed(&txn, txid, true)?;
            store::set_indexed(&txn, txid, false)?;
            txn.commit()?;
        }

        let was_queued = self.graph.get(txid).map(|n| n.queued_for_execution).unwrap_or(false);
        let downstream = self.graph.downstream(txid);
        self.graph.remove_node(txid);
        if was_queued {
            self.readiness.decrement();
        }

        if was_executable {
            for down in downstream {
                self.set_execution_failed_inner(&down, visited)?;
            }
        } else {
            for down in downstream {
                self.check_executability_and_emit_unflipped_root(&down);
            }
        }
        Ok(())
    }

    /// Inserts edges for executor-discovered dependencies — all inside
    /// one store transaction — and re-evaluates readiness. A no-op if
    /// `txid` is no longer in the unexecuted graph (raced with a delete).
    pub fn add_missing_deps(&mut self, txid: &Txid, extra_deps: &[Txid]) -> EngineResult<()> {
        if !self.graph.contains(txid) {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        let mut new_deps = Vec::new();
        {
            let txn = self.store.begin()?;
            for dep in extra_deps {
                if !store::tx_exists(&txn, dep)? {
                    store::insert_new_tx(&txn, dep, Height::Unknown, Some(now))?;
                    new_deps.push(*dep);
                }
                store::insert_dep(&txn, dep, txid)?;
            }
            txn.commit()?;
        }

        for dep in &new_deps {
            self.graph.ensure_node(*dep);
            self.check_executability(dep, None);
            self.sink.on_add_transaction(dep);
            super::log_applied("add_new", dep);
        }

        for dep in extra_deps {
            if self.graph.contains(dep) {
                self.graph.add_edge(dep, txid);
            }
        }

        // A newly-discovered dep already indexed (absent from the graph)
        // doesn't change `txid`'s flag, but the executor is waiting on a
        // fresh verdict for this specific call, so re-announce readiness
        // even when the flag was already true.
        self.check_executability_and_emit_unflipped_root(txid);
        self.assert_invariants();
        Ok(())
    }

    /// Resets `executed=0, indexed=0`, clears this txid's jig/berry
    /// states, and resurrects the node (with upstream rebuilt from
    /// persisted edges, restricted to endpoints still unexecuted),
    /// forcing it not-ready until the next evaluation. Recurses into
    /// every persisted downstream neighbour.
    pub fn unindex(&mut self, txid: &Txid) -> EngineResult<()> {
        self.unindex_inner(txid, &mut HashSet::new())
    }

    fn unindex_inner(&mut self, txid: &Txid, visited: &mut HashSet<Txid>) -> EngineResult<()> {
        if !visited.insert(*txid) {
            return Ok(());
        }

        let downstream = store::get_downstream(self.store.conn(), txid)?;

        {
            let txn = self.store.begin()?;
            store::set_executed(&txn, txid, false)?;
            store::set_indexed(&txn, txid, false)?;
            store::delete_locations_for_tx(&txn, txid)?;
            txn.commit()?;
        }

        self.graph.ensure_node(*txid);
        if let Some(record) = store::get_tx(self.store.conn(), txid)? {
            if let Some(node) = self.graph.get_mut(txid) {
                node.downloaded = record.bytes.is_some();
                node.has_code = record.has_code;
            }
        }
        for up in store::get_upstream(self.store.conn(), txid)? {
            if self.graph.contains(&up) {
                self.graph.add_edge(&up, txid);
            }
        }
        self.check_executability(txid, Some(false));

        self.sink.on_unindex_transaction(txid);

        for down in downstream {
            self.unindex_inner(&down, visited)?;
        }
        Ok(())
    }

    /// Deletes the record, its jig/berry states, its edges in both
    /// directions, and clears spend attribution for anything it spent.
    /// Recurses into every downstream neighbour; guarded by a visited set
    /// so a corrupted cyclic edge table cannot diverge.
    pub fn delete_transaction(&mut self, txid: &Txid) -> EngineResult<()> {
        self.delete_transaction_inner(txid, &mut HashSet::new())
    }

    fn delete_transaction_inner(&mut self, txid: &Txid, visited: &mut HashSet<Txid>) -> EngineResult<()> {
        if !visited.insert(*txid) {
            return Ok(());
        }

        let downstream = store::get_downstream(self.store.conn(), txid)?;
        let was_queued = self.graph.get(txid).map(|n| n.queued_for_execution).unwrap_or(false);

        {
            let txn = self.store.begin()?;
            store::delete_tx(&txn, txid)?;
            store::clear_spend_attribution_by(&txn, txid)?;
            txn.commit()?;
        }

        self.graph.remove_node(txid);
        if was_queued {
            self.readiness.decrement();
        }

        self.sink.on_delete_transaction(txid);

        for down in downstream {
            self.delete_transaction_inner(&down, visited)?;
        }
        Ok(())
    }
}

fn write_execution_result(txn: &rusqlite::Transaction, result: &ExecutionResult) -> EngineResult<()> {
    for (key, state) in &result.cache {
        if let Some(location) = key.strip_prefix("jig://") {
            let location = Location::new(location);
            store::upsert_jig(
                txn,
                &store::JigRecord {
                    class: result.classes.get(&location).cloned(),
                    lock: result.locks.get(&location).cloned(),
                    scripthash: result.scripthashes.get(&location).cloned(),
                    state: Some(state.clone()),
                    location,
                },
            )?;
        } else if let Some(location) = key.strip_prefix("berry://") {
            store::upsert_berry(
                txn,
                &store::BerryRecord {
                    location: Location::new(location),
                    state: Some(state.clone()),
                },
            )?;
        }
    }
    Ok(())
}
