//! Interfaces to the two external collaborators named in the overview:
//! the block/mempool source the driver polls, and the result shape the
//! executor hands back through `storeExecuted`. Neither is implemented
//! here — production chain-watching and replay logic lives outside this
//! crate; this module only fixes the contract.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::{Location, Txid};

/// One confirmed block as reported by a `ChainSource`.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub height: u32,
    pub hash: String,
    pub prev_hash: String,
    pub time: i64,
    pub txids: Vec<Txid>,
    pub raw_txns: Vec<(Txid, Vec<u8>)>,
}

/// What `getNextBlock` can report.
#[derive(Debug, Clone)]
pub enum ChainSourceEvent {
    Block(ChainBlock),
    /// The next block's `prev_hash` does not match the driver's current
    /// tip hash; the driver must rewind before asking again.
    Reorg,
}

/// Abstract block/mempool feed. The driver polls `next_block` against its
/// own `(height, hash)` bookmark and separately drains `next_mempool_tx`.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn next_block(&mut self, current_height: Option<u32>, current_hash: Option<&str>) -> Option<ChainSourceEvent>;

    async fn next_mempool_tx(&mut self) -> Option<(Txid, Vec<u8>)>;
}

/// A source with nothing to report; used when running the engine as a
/// library without a live chain feed wired in.
pub struct NullChainSource;

#[async_trait]
impl ChainSource for NullChainSource {
    async fn next_block(&mut self, _current_height: Option<u32>, _current_hash: Option<&str>) -> Option<ChainSourceEvent> {
        None
    }

    async fn next_mempool_tx(&mut self) -> Option<(Txid, Vec<u8>)> {
        None
    }
}

/// The executor's result bundle, as consumed by `storeExecuted`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Keyed by `jig://<location>` or `berry://<location>`, holding the
    /// opaque serialized state for that location.
    pub cache: HashMap<String, String>,
    pub classes: HashMap<Location, String>,
    pub locks: HashMap<Location, String>,
    pub scripthashes: HashMap<Location, String>,
}

pub mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// A `ChainSource` that replays a fixed, pre-scripted sequence of
    /// blocks and mempool transactions, for deterministic engine tests.
    pub struct ScriptedChainSource {
        blocks: Mutex<VecDeque<ChainSourceEvent>>,
        mempool: Mutex<VecDeque<(Txid, Vec<u8>)>>,
    }

    impl ScriptedChainSource {
        pub fn new(blocks: Vec<ChainSourceEvent>, mempool: Vec<(Txid, Vec<u8>)>) -> Self {
            ScriptedChainSource {
                blocks: Mutex::new(blocks.into()),
                mempool: Mutex::new(mempool.into()),
            }
        }
    }

    #[async_trait]
    impl ChainSource for ScriptedChainSource {
        async fn next_block(&mut self, _current_height: Option<u32>, _current_hash: Option<&str>) -> Option<ChainSourceEvent> {
            self.blocks.lock().await.pop_front()
        }

        async fn next_mempool_tx(&mut self) -> Option<(Txid, Vec<u8>)> {
            self.mempool.lock().await.pop_front()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedChainSource;
    use super::*;

    #[tokio::test]
    async fn null_source_reports_nothing() {
        let mut source = NullChainSource;
        assert!(source.next_block(None, None).await.is_none());
        assert!(source.next_mempool_tx().await.is_none());
    }

    #[tokio::test]
    async fn scripted_source_replays_in_order() {
        let mut source = ScriptedChainSource::new(vec![ChainSourceEvent::Reorg], vec![]);
        assert!(matches!(source.next_block(None, None).await, Some(ChainSourceEvent::Reorg)));
        assert!(source.next_block(None, None).await.is_none());
    }
}
