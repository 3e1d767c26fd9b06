//! Trust/ban registry operations that also touch the graph and fire
//! events — the parts `TrustBanRegistry` itself deliberately doesn't own,
//! since it only mirrors the persisted sets.

use std::collections::{HashSet, VecDeque};

use crate::error::EngineResult;
use crate::store;
use crate::types::Txid;

use super::Engine;

impl Engine {
    pub fn is_trusted(&self, txid: &Txid) -> bool {
        self.trust.is_trusted(txid)
    }

    pub fn is_banned(&self, txid: &Txid) -> bool {
        self.trust.is_banned(txid)
    }

    /// Inserts `txid` into the trust set, plus every upstream ancestor
    /// (walked through the unexecuted graph) that carries code and is not
    /// already trusted — trusting a leaf is assumed to mean trusting its
    /// whole dependency closure, or the closure would sit permanently
    /// stuck. All insertions happen in one store transaction; readiness is
    /// re-evaluated and `on_trust_transaction` fires for each newly-trusted
    /// txid afterward, in BFS discovery order.
    pub fn trust(&mut self, txid: &Txid) -> EngineResult<()> {
        let mut newly_trusted = Vec::new();
        if !self.trust.is_trusted(txid) {
            newly_trusted.push(*txid);
        }
        newly_trusted.extend(self.untrusted_code_ancestors(txid));

        {
            let txn = self.store.begin()?;
            for t in &newly_trusted {
                store::insert_trust(&txn, t)?;
            }
            txn.commit()?;
        }
        for t in &newly_trusted {
            self.trust.insert_trusted(*t);
        }

        for t in &newly_trusted {
            self.check_executability(t, None);
        }
        for t in &newly_trusted {
            self.sink.on_trust_transaction(t);
        }
        self.assert_invariants();
        Ok(())
    }

    /// `unindex(txid)` then removes it from the trust set. Already-indexed
    /// descendant state produced under the revoked trust is not restored;
    /// the caller must re-index if it still wants that state.
    pub fn untrust(&mut self, txid: &Txid) -> EngineResult<()> {
        self.unindex(txid)?;
        {
            let txn = self.store.begin()?;
            store::remove_trust(&txn, txid)?;
            txn.commit()?;
        }
        self.trust.remove_trusted(txid);
        self.sink.on_untrust_transaction(txid);
        self.assert_invariants();
        Ok(())
    }

    /// `unindex(txid)` then inserts it into the ban set. A banned txid is
    /// never ready regardless of trust.
    pub fn ban(&mut self, txid: &Txid) -> EngineResult<()> {
        self.unindex(txid)?;
        {
            let txn = self.store.begin()?;
            store::insert_ban(&txn, txid)?;
            txn.commit()?;
        }
        self.trust.insert_banned(*txid);
        self.check_executability(txid, None);
        self.sink.on_ban_transaction(txid);
        self.assert_invariants();
        Ok(())
    }

    /// Removes `txid` from the ban set and re-evaluates its readiness if it
    /// is still unexecuted.
    pub fn unban(&mut self, txid: &Txid) -> EngineResult<()> {
        {
            let txn = self.store.begin()?;
            store::remove_ban(&txn, txid)?;
            txn.commit()?;
        }
        self.trust.remove_banned(txid);
        if self.graph.contains(txid) {
            self.check_executability(txid, None);
        }
        self.sink.on_unban_transaction(txid);
        self.assert_invariants();
        Ok(())
    }

    /// All unexecuted nodes that carry code and are not currently trusted.
    pub fn get_all_untrusted(&self) -> Vec<Txid> {
        self.graph
            .txids()
            .filter(|t| {
                let node = self.graph.get(t).unwrap();
                node.has_code == Some(true) && !self.trust.is_trusted(t)
            })
            .copied()
            .collect()
    }

    /// BFS upstream over the unexecuted graph from `txid`, collecting the
    /// transitive set of untrusted code-bearing ancestors, including
    /// `txid` itself if it qualifies.
    pub fn get_transaction_untrusted(&self, txid: &Txid) -> Vec<Txid> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*txid]);
        seen.insert(*txid);
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.graph.get(&current) {
                if node.has_code == Some(true) && !self.trust.is_trusted(&current) {
                    out.push(current);
                }
            }
            for up in self.graph.upstream(&current) {
                if seen.insert(up) {
                    queue.push_back(up);
                }
            }
        }
        out
    }

    /// BFS upstream from `txid` over the unexecuted graph, collecting every
    /// ancestor with `has_code=true` that is not already trusted (`txid`
    /// itself is never included — callers add it separately).
    fn untrusted_code_ancestors(&self, txid: &Txid) -> Vec<Txid> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(*txid);
        let mut queue: VecDeque<Txid> = self.graph.upstream(txid).into_iter().collect();
        for up in &queue {
            seen.insert(*up);
        }
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.graph.get(&current) {
                if node.has_code == Some(true) && !self.trust.is_trusted(&current) {
                    out.push(current);
                }
            }
            for up in self.graph.upstream(&current) {
                if seen.insert(up) {
                    queue.push_back(up);
                }
            }
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn graph_contains_for_test(&self, txid: &Txid) -> bool {
        self.graph.contains(txid)
    }
}
