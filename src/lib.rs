//! The transaction dependency engine: a persistent DAG of code-carrying
//! blockchain transactions, the in-memory unexecuted subgraph, and the
//! readiness scheduler that decides which transactions are eligible to
//! execute. See `SPEC_FULL.md` for the full component breakdown.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod interfaces;
pub mod logging;
pub mod readiness;
pub mod store;
pub mod trust;
pub mod types;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use types::{Height, Location, Txid};
