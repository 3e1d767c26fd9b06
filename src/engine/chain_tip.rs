//! Chain-tip tracker: the current `(height, hash)` bookmark, plus the
//! read-only queries a driver needs to detect and recover from a reorg or
//! to evict stale mempool entries.

use crate::error::EngineResult;
use crate::store;
use crate::types::Txid;

use super::Engine;

impl Engine {
    pub fn get_height(&self) -> EngineResult<Option<u32>> {
        Ok(store::get_tip_height(self.store.conn())?)
    }

    pub fn get_hash(&self) -> EngineResult<Option<String>> {
        Ok(store::get_tip_hash(self.store.conn())?)
    }

    pub fn set_height_and_hash(&mut self, height: u32, hash: &str) -> EngineResult<()> {
        let txn = self.store.begin()?;
        store::set_tip(&txn, height, hash)?;
        txn.commit()?;
        Ok(())
    }

    /// Txids persisted with a confirmed height strictly above `height`, for
    /// a driver rewinding after a reorg.
    pub fn get_transactions_above_height(&self, height: u32) -> EngineResult<Vec<Txid>> {
        Ok(store::get_transactions_above_height(self.store.conn(), height)?)
    }

    /// Mempool-resident txids (`height = MEMPOOL`) received before `before`,
    /// for a driver evicting stale mempool entries.
    pub fn get_mempool_transactions_before_time(&self, before: i64) -> EngineResult<Vec<Txid>> {
        Ok(store::get_mempool_transactions_before_time(self.store.conn(), before)?)
    }

    /// Delete every transaction above `height`, transitively (each delete
    /// cascades to its own downstream), then move the tip bookmark back to
    /// `(height, hash)`. This is the obvious composition of
    /// `get_transactions_above_height` + `delete_transaction` the driver
    /// would otherwise hand-roll on every reorg.
    pub fn rewind_above(&mut self, height: u32, hash: &str) -> EngineResult<()> {
        for txid in self.get_transactions_above_height(height)? {
            self.delete_transaction(&txid)?;
        }
        self.set_height_and_hash(height, hash)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::NoopEventSink;
    use crate::types::Height;

    fn txid(byte: u8) -> Txid {
        Txid::from_bytes([byte; 32])
    }

    fn engine() -> Engine {
        Engine::open_in_memory(&Config::default(), Box::new(NoopEventSink)).unwrap()
    }

    #[test]
    fn tip_defaults_unset_then_round_trips() {
        let mut e = engine();
        assert_eq!(e.get_height().unwrap(), None);
        e.set_height_and_hash(42, "deadbeef").unwrap();
        assert_eq!(e.get_height().unwrap(), Some(42));
        assert_eq!(e.get_hash().unwrap(), Some("deadbeef".to_string()));
    }

    #[test]
    fn s6_reorg_rewind_deletes_above_fork_point() {
        let mut e = engine();
        let (a, b, c) = (txid(1), txid(2), txid(3));
        e.add_new(&a, Some(Height::Confirmed(98))).unwrap();
        e.add_new(&b, Some(Height::Confirmed(99))).unwrap();
        e.add_new(&c, Some(Height::Confirmed(100))).unwrap();
        e.store_parsed_executable(&a, b"a", false, &[], &[], &[]).unwrap();
        e.store_parsed_executable(&b, b"b", false, &[a], &[], &[]).unwrap();
        e.store_parsed_executable(&c, b"c", false, &[b], &[], &[]).unwrap();
        e.set_height_and_hash(100, "tip-100").unwrap();

        e.rewind_above(98, "tip-98").unwrap();

        assert!(store::get_tx(e.store().conn(), &b).unwrap().is_none());
        assert!(store::get_tx(e.store().conn(), &c).unwrap().is_none());
        assert!(store::get_tx(e.store().conn(), &a).unwrap().is_some());
        assert_eq!(e.get_height().unwrap(), Some(98));
        assert_eq!(e.get_hash().unwrap(), Some("tip-98".to_string()));
    }
}
