//! In-memory mirror of the persisted trust/ban sets.
//!
//! The registry itself only answers `is_trusted`/`is_banned` in O(1) and
//! keeps the two sets consistent with the `trust`/`ban` tables; the
//! higher-level `trust`/`untrust`/`ban`/`unban` operations that also touch
//! the graph and fire events live in [`crate::engine`], since they need
//! the full picture this registry deliberately doesn't hold.

use std::collections::HashSet;

use crate::store::{self, StoreResult};
use crate::types::Txid;

#[derive(Debug, Default)]
pub struct TrustBanRegistry {
    trusted: HashSet<Txid>,
    banned: HashSet<Txid>,
}

impl TrustBanRegistry {
    pub fn new() -> Self {
        TrustBanRegistry {
            trusted: HashSet::new(),
            banned: HashSet::new(),
        }
    }

    /// Rebuild the in-memory sets from the persisted tables, as done once
    /// on open.
    pub fn load(conn: &rusqlite::Connection) -> StoreResult<Self> {
        let mut registry = TrustBanRegistry::new();
        for txid in store::get_all_trusted(conn)? {
            registry.trusted.insert(txid);
        }
        for txid in store::get_all_banned(conn)? {
            registry.banned.insert(txid);
        }
        Ok(registry)
    }

    pub fn is_trusted(&self, txid: &Txid) -> bool {
        self.trusted.contains(txid)
    }

    pub fn is_banned(&self, txid: &Txid) -> bool {
        self.banned.contains(txid)
    }

    pub fn trusted_iter(&self) -> impl Iterator<Item = &Txid> {
        self.trusted.iter()
    }

    pub fn insert_trusted(&mut self, txid: Txid) {
        self.trusted.insert(txid);
    }

    pub fn remove_trusted(&mut self, txid: &Txid) {
        self.trusted.remove(txid);
    }

    pub fn insert_banned(&mut self, txid: Txid) {
        self.banned.insert(txid);
    }

    pub fn remove_banned(&mut self, txid: &Txid) {
        self.banned.remove(txid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(byte: u8) -> Txid {
        Txid::from_bytes([byte; 32])
    }

    #[test]
    fn ban_and_trust_are_independent_sets() {
        let mut registry = TrustBanRegistry::new();
        registry.insert_trusted(txid(1));
        registry.insert_banned(txid(1));
        assert!(registry.is_trusted(&txid(1)));
        assert!(registry.is_banned(&txid(1)));

        registry.remove_trusted(&txid(1));
        assert!(!registry.is_trusted(&txid(1)));
        assert!(registry.is_banned(&txid(1)));
    }
}
