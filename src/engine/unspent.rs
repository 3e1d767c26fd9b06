//! Unspent index: the spend/unspent lookups built as an inner join
//! between `spends` and `jig` on `location`, plus `get_transaction_hex`,
//! the one `tx`-table read named directly in the executor interface.

use crate::error::EngineResult;
use crate::store::{self, UnspentFilter};
use crate::types::{Location, Txid};

use super::Engine;

impl Engine {
    pub fn get_spend(&self, location: &Location) -> EngineResult<Option<Txid>> {
        Ok(store::get_spend(self.store.conn(), location)?)
    }

    pub fn get_all_unspent(&self, filter: &UnspentFilter) -> EngineResult<Vec<Location>> {
        Ok(store::get_all_unspent(self.store.conn(), filter)?)
    }

    pub fn get_num_unspent(&self, filter: &UnspentFilter) -> EngineResult<i64> {
        Ok(store::get_num_unspent(self.store.conn(), filter)?)
    }

    /// Hex-encoded raw bytes for `txid`, as the executor fetches when
    /// reacting to `on_ready_to_execute`. `None` if the transaction hasn't
    /// been downloaded yet.
    pub fn get_transaction_hex(&self, txid: &Txid) -> EngineResult<Option<String>> {
        let record = store::get_tx(self.store.conn(), txid)?;
        Ok(record.and_then(|r| r.bytes).map(hex::encode))
    }
}
