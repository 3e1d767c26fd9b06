//! Row types returned by the [`Store`](super::Store) façade.

use crate::types::{Height, Location, Txid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub txid: Txid,
    pub height: Height,
    pub time: Option<i64>,
    pub bytes: Option<Vec<u8>>,
    pub has_code: Option<bool>,
    pub executable: bool,
    pub executed: bool,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JigRecord {
    pub location: Location,
    pub state: Option<String>,
    pub class: Option<String>,
    pub lock: Option<String>,
    pub scripthash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BerryRecord {
    pub location: Location,
    pub state: Option<String>,
}

/// Filter for `get_all_unspent` / `get_num_unspent`. Every field left `None`
/// is unconstrained; this single struct covers every filtered variant (by
/// class, by lock, by scripthash, and their pairwise/triple combinations)
/// as one parameterized query instead of seven near-identical ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnspentFilter {
    pub class: Option<String>,
    pub lock: Option<String>,
    pub scripthash: Option<String>,
}

impl UnspentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    pub fn with_scripthash(mut self, scripthash: impl Into<String>) -> Self {
        self.scripthash = Some(scripthash.into());
        self
    }
}
