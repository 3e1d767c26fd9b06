//! Core identifiers and value types shared across the engine.
//!
//! These types exist so that illegal states (a non-hex txid, a height that
//! is neither confirmed nor the mempool sentinel) are unrepresentable rather
//! than caught at the storage boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 32-byte transaction identifier, always rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Txid([u8; 32]);

#[derive(Error, Debug)]
pub enum TxidParseError {
    #[error("txid must be 64 hex characters, got {0}")]
    WrongLength(usize),
    #[error("invalid hex in txid: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl Txid {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Txid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The `<txid>` prefix used by the cascading-delete `LIKE` scan over
    /// `jig`/`berry` locations (`<txid>_o<n>` / `<txid>_d<n>`).
    pub fn location_prefix(&self) -> String {
        self.to_hex()
    }
}

impl FromStr for Txid {
    type Err = TxidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(TxidParseError::WrongLength(s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Txid(bytes))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self.to_hex())
    }
}

/// `height` as persisted: a confirmed block height, the mempool sentinel, or
/// absent entirely (not yet seen in a block or mempool snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Height {
    Confirmed(u32),
    Mempool,
    Unknown,
}

/// The sentinel used for mempool transactions in the `tx.height` column.
pub const MEMPOOL_HEIGHT_SENTINEL: i64 = -1;

impl Height {
    /// Decode the `tx.height` column (`NULL` => `Unknown`).
    pub fn from_db(value: Option<i64>) -> Self {
        match value {
            None => Height::Unknown,
            Some(h) if h == MEMPOOL_HEIGHT_SENTINEL => Height::Mempool,
            Some(h) => Height::Confirmed(h as u32),
        }
    }

    /// Encode for the `tx.height` column.
    pub fn to_db(self) -> Option<i64> {
        match self {
            Height::Unknown => None,
            Height::Mempool => Some(MEMPOOL_HEIGHT_SENTINEL),
            Height::Confirmed(h) => Some(h as i64),
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, Height::Confirmed(_))
    }
}

/// A jig/berry output location: `<txid>_o<n>`, or a derivative location
/// `<txid>_d<n>` as emitted by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(String);

impl Location {
    pub fn new(raw: impl Into<String>) -> Self {
        Location(raw.into())
    }

    pub fn output(txid: &Txid, index: u32) -> Self {
        Location(format!("{}_o{}", txid.to_hex(), index))
    }

    pub fn derivative(txid: &Txid, index: u32) -> Self {
        Location(format!("{}_d{}", txid.to_hex(), index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `<txid>` prefix the core uses for cascading deletes
    /// (`LIKE txid || '%'`).
    pub fn txid_prefix(&self) -> &str {
        self.0.split('_').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txid_roundtrips_through_hex() {
        let bytes = [0x7fu8; 32];
        let txid = Txid::from_bytes(bytes);
        let hex = txid.to_hex();
        assert_eq!(hex.len(), 64);
        let parsed: Txid = hex.parse().unwrap();
        assert_eq!(parsed, txid);
    }

    #[test]
    fn txid_rejects_wrong_length() {
        assert!("deadbeef".parse::<Txid>().is_err());
    }

    #[test]
    fn height_roundtrips_sentinels() {
        assert_eq!(Height::from_db(None), Height::Unknown);
        assert_eq!(Height::from_db(Some(-1)), Height::Mempool);
        assert_eq!(Height::from_db(Some(100)), Height::Confirmed(100));
        assert_eq!(Height::Mempool.to_db(), Some(-1));
        assert_eq!(Height::Unknown.to_db(), None);
        assert_eq!(Height::Confirmed(42).to_db(), Some(42));
    }

    #[test]
    fn location_grammar() {
        let txid: Txid = "a".repeat(64).parse().unwrap();
        let loc = Location::output(&txid, 3);
        assert_eq!(loc.as_str(), format!("{}_o3", "a".repeat(64)));
        assert_eq!(loc.txid_prefix(), "a".repeat(64));
    }
}
