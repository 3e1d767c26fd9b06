//! Store façade: the single point of contact with the on-disk database.
//! Every mutation the engine performs against these tables happens inside
//! one [`rusqlite::Transaction`] per ingestion operation, committed only
//! after the in-memory graph/trust/readiness state has been updated to
//! match — commit-then-notify ordering throughout.

mod migration;
mod record;
mod schema;

use rusqlite::{Connection, OptionalExtension, Transaction};
use thiserror::Error;
use tracing::warn;

pub use record::{BerryRecord, JigRecord, TxRecord, UnspentFilter};

use crate::config::StoreConfig;
use crate::types::{Height, Location, Txid};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unsupported schema version {0}, expected {}", migration::CURRENT_VERSION)]
    UnknownSchemaVersion(i64),

    #[error("malformed txid in database: {0}")]
    MalformedTxid(#[from] crate::types::TxidParseError),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &str, config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: &StoreConfig) -> StoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -(config.cache_size_kib))?;
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        migration::migrate(&conn)?;
        Ok(Store { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin an atomic transaction. The caller drives every [`Store`]
    /// operation for one ingestion step through the returned handle and
    /// calls `commit()` once the in-memory state has been prepared.
    pub fn begin(&mut self) -> StoreResult<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

fn row_to_tx(row: &rusqlite::Row) -> rusqlite::Result<TxRecord> {
    let txid_hex: String = row.get("txid")?;
    let txid = txid_hex
        .parse::<Txid>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let has_code: Option<i64> = row.get("has_code")?;
    Ok(TxRecord {
        txid,
        height: Height::from_db(row.get("height")?),
        time: row.get("time")?,
        bytes: row.get("bytes")?,
        has_code: has_code.map(|v| v != 0),
        executable: row.get::<_, i64>("executable")? != 0,
        executed: row.get::<_, i64>("executed")? != 0,
        indexed: row.get::<_, i64>("indexed")? != 0,
    })
}

// --- tx -----------------------------------------------------------------

pub fn insert_new_tx(conn: &Connection, txid: &Txid, height: Height, time: Option<i64>) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tx (txid, height, time, executable, executed, indexed) VALUES (?1, ?2, ?3, 0, 0, 0)
         ON CONFLICT(txid) DO NOTHING",
        rusqlite::params![txid.to_hex(), height.to_db(), time],
    )?;
    Ok(())
}

pub fn get_tx(conn: &Connection, txid: &Txid) -> StoreResult<Option<TxRecord>> {
    conn.query_row("SELECT * FROM tx WHERE txid = ?1", [txid.to_hex()], row_to_tx)
        .optional()
        .map_err(StoreError::from)
}

pub fn tx_exists(conn: &Connection, txid: &Txid) -> StoreResult<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tx WHERE txid = ?1", [txid.to_hex()], |r| r.get(0))?;
    Ok(count > 0)
}

pub fn update_tx_bytes(conn: &Connection, txid: &Txid, bytes: &[u8], has_code: bool) -> StoreResult<()> {
    conn.execute(
        "UPDATE tx SET bytes = ?2, has_code = ?3 WHERE txid = ?1",
        rusqlite::params![txid.to_hex(), bytes, has_code as i64],
    )?;
    Ok(())
}

pub fn set_executable(conn: &Connection, txid: &Txid, executable: bool) -> StoreResult<()> {
    conn.execute(
        "UPDATE tx SET executable = ?2 WHERE txid = ?1",
        rusqlite::params![txid.to_hex(), executable as i64],
    )?;
    Ok(())
}

pub fn set_executed(conn: &Connection, txid: &Txid, executed: bool) -> StoreResult<()> {
    conn.execute(
        "UPDATE tx SET executed = ?2 WHERE txid = ?1",
        rusqlite::params![txid.to_hex(), executed as i64],
    )?;
    Ok(())
}

pub fn set_indexed(conn: &Connection, txid: &Txid, indexed: bool) -> StoreResult<()> {
    conn.execute(
        "UPDATE tx SET indexed = ?2 WHERE txid = ?1",
        rusqlite::params![txid.to_hex(), indexed as i64],
    )?;
    Ok(())
}

pub fn set_height_time(conn: &Connection, txid: &Txid, height: Height, time: Option<i64>) -> StoreResult<()> {
    conn.execute(
        "UPDATE tx SET height = ?2, time = ?3 WHERE txid = ?1",
        rusqlite::params![txid.to_hex(), height.to_db(), time],
    )?;
    Ok(())
}

pub fn delete_tx(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    conn.execute("DELETE FROM tx WHERE txid = ?1", [txid.to_hex()])?;
    delete_deps_for_tx(conn, txid)?;
    delete_locations_for_tx(conn, txid)?;
    Ok(())
}

/// Rows satisfying the unexecuted-graph membership condition:
/// `(executable=1 AND executed=0) OR bytes IS NULL`. Used once, to rebuild
/// the in-memory graph on open.
pub fn get_unexecuted_candidates(conn: &Connection) -> StoreResult<Vec<TxRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tx WHERE (executable = 1 AND executed = 0) OR bytes IS NULL",
    )?;
    let rows = stmt.query_map([], row_to_tx)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_transactions_above_height(conn: &Connection, height: u32) -> StoreResult<Vec<Txid>> {
    let mut stmt = conn.prepare("SELECT txid FROM tx WHERE height IS NOT NULL AND height > ?1")?;
    let rows = stmt.query_map([height as i64], |r| r.get::<_, String>(0))?;
    collect_txids(rows)
}

pub fn get_mempool_transactions_before_time(conn: &Connection, before: i64) -> StoreResult<Vec<Txid>> {
    let mut stmt = conn.prepare(
        "SELECT txid FROM tx WHERE height = -1 AND time IS NOT NULL AND time < ?1",
    )?;
    let rows = stmt.query_map([before], |r| r.get::<_, String>(0))?;
    collect_txids(rows)
}

fn collect_txids(rows: impl Iterator<Item = rusqlite::Result<String>>) -> StoreResult<Vec<Txid>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.parse::<Txid>()?);
    }
    Ok(out)
}

// --- deps -----------------------------------------------------------------

/// Record `down` as depending on `up`. A self-edge is dropped with a
/// warning rather than inserted: the upstream/downstream BFS walks in
/// `graph` and `trust` would otherwise loop forever on it.
pub fn insert_dep(conn: &Connection, up: &Txid, down: &Txid) -> StoreResult<()> {
    if up == down {
        warn!(txid = %up, "refusing to record a dependency edge from a transaction to itself");
        return Ok(());
    }
    conn.execute(
        "INSERT INTO deps (up, down) VALUES (?1, ?2) ON CONFLICT(up, down) DO NOTHING",
        [up.to_hex(), down.to_hex()],
    )?;
    Ok(())
}

pub fn delete_deps_for_tx(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    conn.execute("DELETE FROM deps WHERE up = ?1 OR down = ?1", [txid.to_hex()])?;
    Ok(())
}

pub fn get_upstream(conn: &Connection, txid: &Txid) -> StoreResult<Vec<Txid>> {
    let mut stmt = conn.prepare("SELECT up FROM deps WHERE down = ?1")?;
    let rows = stmt.query_map([txid.to_hex()], |r| r.get::<_, String>(0))?;
    collect_txids(rows)
}

pub fn get_downstream(conn: &Connection, txid: &Txid) -> StoreResult<Vec<Txid>> {
    let mut stmt = conn.prepare("SELECT down FROM deps WHERE up = ?1")?;
    let rows = stmt.query_map([txid.to_hex()], |r| r.get::<_, String>(0))?;
    collect_txids(rows)
}

// --- jig / berry ------------------------------------------------------------

pub fn upsert_jig(conn: &Connection, jig: &JigRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO jig (location, state, class, lock, scripthash) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(location) DO UPDATE SET state = excluded.state, class = excluded.class,
             lock = excluded.lock, scripthash = excluded.scripthash",
        rusqlite::params![jig.location.as_str(), jig.state, jig.class, jig.lock, jig.scripthash],
    )?;
    Ok(())
}

pub fn upsert_berry(conn: &Connection, berry: &BerryRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO berry (location, state) VALUES (?1, ?2)
         ON CONFLICT(location) DO UPDATE SET state = excluded.state",
        rusqlite::params![berry.location.as_str(), berry.state],
    )?;
    Ok(())
}

pub fn get_jig(conn: &Connection, location: &Location) -> StoreResult<Option<JigRecord>> {
    conn.query_row(
        "SELECT location, state, class, lock, scripthash FROM jig WHERE location = ?1",
        [location.as_str()],
        |row| {
            Ok(JigRecord {
                location: Location::new(row.get::<_, String>(0)?),
                state: row.get(1)?,
                class: row.get(2)?,
                lock: row.get(3)?,
                scripthash: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

pub fn get_berry(conn: &Connection, location: &Location) -> StoreResult<Option<BerryRecord>> {
    conn.query_row(
        "SELECT location, state FROM berry WHERE location = ?1",
        [location.as_str()],
        |row| {
            Ok(BerryRecord {
                location: Location::new(row.get::<_, String>(0)?),
                state: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

pub fn delete_locations_for_tx(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    let prefix = format!("{}%", txid.location_prefix());
    conn.execute("DELETE FROM jig WHERE location LIKE ?1", [&prefix])?;
    conn.execute("DELETE FROM berry WHERE location LIKE ?1", [&prefix])?;
    conn.execute("DELETE FROM spends WHERE location LIKE ?1", [&prefix])?;
    Ok(())
}

// --- spends -----------------------------------------------------------------

pub fn set_spend(conn: &Connection, location: &Location, spend_txid: Option<&Txid>) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO spends (location, spend_txid) VALUES (?1, ?2)
         ON CONFLICT(location) DO UPDATE SET spend_txid = excluded.spend_txid",
        rusqlite::params![location.as_str(), spend_txid.map(Txid::to_hex)],
    )?;
    Ok(())
}

/// Reset every location this txid spent back to unspent. Called when the
/// spending transaction itself is deleted — its spends no longer hold.
pub fn clear_spend_attribution_by(conn: &Connection, spender: &Txid) -> StoreResult<()> {
    conn.execute(
        "UPDATE spends SET spend_txid = NULL WHERE spend_txid = ?1",
        [spender.to_hex()],
    )?;
    Ok(())
}

pub fn get_spend(conn: &Connection, location: &Location) -> StoreResult<Option<Txid>> {
    let spend_txid: Option<Option<String>> = conn
        .query_row(
            "SELECT spend_txid FROM spends WHERE location = ?1",
            [location.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    match spend_txid.flatten() {
        Some(hex) => Ok(Some(hex.parse()?)),
        None => Ok(None),
    }
}

pub fn get_all_unspent(conn: &Connection, filter: &UnspentFilter) -> StoreResult<Vec<Location>> {
    let (clause, params) = unspent_where_clause(filter);
    let sql = format!(
        "SELECT jig.location FROM jig INNER JOIN spends ON jig.location = spends.location
         WHERE spends.spend_txid IS NULL{}",
        clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(Location::new(row?));
    }
    Ok(out)
}

pub fn get_num_unspent(conn: &Connection, filter: &UnspentFilter) -> StoreResult<i64> {
    let (clause, params) = unspent_where_clause(filter);
    let sql = format!(
        "SELECT COUNT(*) FROM jig INNER JOIN spends ON jig.location = spends.location
         WHERE spends.spend_txid IS NULL{}",
        clause
    );
    let count = conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?;
    Ok(count)
}

fn unspent_where_clause(filter: &UnspentFilter) -> (String, Vec<String>) {
    let mut clause = String::new();
    let mut params = Vec::new();
    if let Some(class) = &filter.class {
        params.push(class.clone());
        clause.push_str(&format!(" AND jig.class = ?{}", params.len()));
    }
    if let Some(lock) = &filter.lock {
        params.push(lock.clone());
        clause.push_str(&format!(" AND jig.lock = ?{}", params.len()));
    }
    if let Some(scripthash) = &filter.scripthash {
        params.push(scripthash.clone());
        clause.push_str(&format!(" AND jig.scripthash = ?{}", params.len()));
    }
    (clause, params)
}

// --- trust / ban -----------------------------------------------------------------

/// Increment the trust refcount for `txid`; it stays trusted until as many
/// `remove_trust` calls have matched the `insert_trust` calls.
pub fn insert_trust(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO trust (txid, value) VALUES (?1, 1)
         ON CONFLICT(txid) DO UPDATE SET value = value + 1",
        [txid.to_hex()],
    )?;
    Ok(())
}

pub fn remove_trust(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    conn.execute(
        "UPDATE trust SET value = value - 1 WHERE txid = ?1",
        [txid.to_hex()],
    )?;
    conn.execute("DELETE FROM trust WHERE txid = ?1 AND value <= 0", [txid.to_hex()])?;
    Ok(())
}

pub fn is_trusted(conn: &Connection, txid: &Txid) -> StoreResult<bool> {
    let value: Option<i64> = conn
        .query_row("SELECT value FROM trust WHERE txid = ?1", [txid.to_hex()], |r| r.get(0))
        .optional()?;
    Ok(value.map(|v| v > 0).unwrap_or(false))
}

pub fn get_all_trusted(conn: &Connection) -> StoreResult<Vec<Txid>> {
    let mut stmt = conn.prepare("SELECT txid FROM trust WHERE value > 0")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    collect_txids(rows)
}

/// Seed the trust table with a fixed list on first open, via
/// `INSERT OR IGNORE` so a user's subsequent edits (including untrusting a
/// seeded txid) survive restarts instead of being re-applied.
pub fn seed_default_trust(conn: &Connection, txids: &[Txid]) -> StoreResult<()> {
    for txid in txids {
        conn.execute(
            "INSERT OR IGNORE INTO trust (txid, value) VALUES (?1, 1)",
            [txid.to_hex()],
        )?;
    }
    Ok(())
}

pub fn insert_ban(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO ban (txid) VALUES (?1) ON CONFLICT(txid) DO NOTHING",
        [txid.to_hex()],
    )?;
    Ok(())
}

pub fn remove_ban(conn: &Connection, txid: &Txid) -> StoreResult<()> {
    conn.execute("DELETE FROM ban WHERE txid = ?1", [txid.to_hex()])?;
    Ok(())
}

pub fn is_banned(conn: &Connection, txid: &Txid) -> StoreResult<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM ban WHERE txid = ?1", [txid.to_hex()], |r| r.get(0))?;
    Ok(count > 0)
}

pub fn get_all_banned(conn: &Connection) -> StoreResult<Vec<Txid>> {
    let mut stmt = conn.prepare("SELECT txid FROM ban")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    collect_txids(rows)
}

// --- crawl tip -----------------------------------------------------------------

pub fn get_tip_height(conn: &Connection) -> StoreResult<Option<u32>> {
    let height: Option<i64> = conn.query_row("SELECT height FROM crawl WHERE role = 'tip'", [], |r| r.get(0))?;
    Ok(height.map(|h| h as u32))
}

pub fn get_tip_hash(conn: &Connection) -> StoreResult<Option<String>> {
    let hash: Option<String> = conn.query_row("SELECT hash FROM crawl WHERE role = 'tip'", [], |r| r.get(0))?;
    Ok(hash)
}

pub fn set_tip(conn: &Connection, height: u32, hash: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE crawl SET height = ?1, hash = ?2 WHERE role = 'tip'",
        rusqlite::params![height, hash],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn open_test_store() -> Store {
        Store::open_in_memory(&StoreConfig::default()).unwrap()
    }

    fn txid(byte: u8) -> Txid {
        Txid::from_bytes([byte; 32])
    }

    #[test]
    fn insert_and_fetch_tx_roundtrips() {
        let store = open_test_store();
        let t = txid(1);
        insert_new_tx(store.conn(), &t, Height::Mempool, Some(100)).unwrap();
        let record = get_tx(store.conn(), &t).unwrap().unwrap();
        assert_eq!(record.txid, t);
        assert_eq!(record.height, Height::Mempool);
        assert!(!record.executable);
        assert!(!record.indexed);
    }

    #[test]
    fn self_dependency_is_dropped() {
        let store = open_test_store();
        let t = txid(2);
        insert_dep(store.conn(), &t, &t).unwrap();
        assert!(get_upstream(store.conn(), &t).unwrap().is_empty());
    }

    #[test]
    fn dep_edges_are_queryable_both_directions() {
        let store = open_test_store();
        let (up, down) = (txid(3), txid(4));
        insert_dep(store.conn(), &up, &down).unwrap();
        assert_eq!(get_upstream(store.conn(), &down).unwrap(), vec![up]);
        assert_eq!(get_downstream(store.conn(), &up).unwrap(), vec![down]);
    }

    #[test]
    fn trust_is_reference_counted() {
        let store = open_test_store();
        let t = txid(5);
        insert_trust(store.conn(), &t).unwrap();
        insert_trust(store.conn(), &t).unwrap();
        assert!(is_trusted(store.conn(), &t).unwrap());
        remove_trust(store.conn(), &t).unwrap();
        assert!(is_trusted(store.conn(), &t).unwrap());
        remove_trust(store.conn(), &t).unwrap();
        assert!(!is_trusted(store.conn(), &t).unwrap());
    }

    #[test]
    fn delete_tx_cascades_deps_and_locations() {
        let store = open_test_store();
        let t = txid(6);
        insert_new_tx(store.conn(), &t, Height::Confirmed(10), None).unwrap();
        insert_dep(store.conn(), &t, &txid(7)).unwrap();
        upsert_jig(
            store.conn(),
            &JigRecord {
                location: Location::output(&t, 0),
                state: Some("{}".to_string()),
                class: Some("Token".to_string()),
                lock: None,
                scripthash: None,
            },
        )
        .unwrap();

        delete_tx(store.conn(), &t).unwrap();

        assert!(get_tx(store.conn(), &t).unwrap().is_none());
        assert!(get_downstream(store.conn(), &t).unwrap().is_empty());
        assert!(get_jig(store.conn(), &Location::output(&t, 0)).unwrap().is_none());
    }

    #[test]
    fn unspent_filter_narrows_by_class() {
        let store = open_test_store();
        let t = txid(8);
        let loc = Location::output(&t, 0);
        upsert_jig(
            store.conn(),
            &JigRecord {
                location: loc.clone(),
                state: None,
                class: Some("Token".to_string()),
                lock: None,
                scripthash: None,
            },
        )
        .unwrap();
        set_spend(store.conn(), &loc, None).unwrap();

        let matching = get_all_unspent(store.conn(), &UnspentFilter::new().with_class("Token")).unwrap();
        assert_eq!(matching, vec![loc]);

        let empty = get_all_unspent(store.conn(), &UnspentFilter::new().with_class("Other")).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn spend_marks_location_as_not_unspent() {
        let store = open_test_store();
        let t = txid(9);
        let spender = txid(10);
        let loc = Location::output(&t, 0);
        upsert_jig(
            store.conn(),
            &JigRecord {
                location: loc.clone(),
                state: None,
                class: None,
                lock: None,
                scripthash: None,
            },
        )
        .unwrap();
        set_spend(store.conn(), &loc, None).unwrap();
        assert_eq!(get_num_unspent(store.conn(), &UnspentFilter::new()).unwrap(), 1);

        set_spend(store.conn(), &loc, Some(&spender)).unwrap();
        assert_eq!(get_spend(store.conn(), &loc).unwrap(), Some(spender));
        assert_eq!(get_num_unspent(store.conn(), &UnspentFilter::new()).unwrap(), 0);
    }

    #[test]
    fn crawl_tip_defaults_to_unset_then_updates() {
        let store = open_test_store();
        assert_eq!(get_tip_height(store.conn()).unwrap(), None);
        set_tip(store.conn(), 500, "deadbeef").unwrap();
        assert_eq!(get_tip_height(store.conn()).unwrap(), Some(500));
        assert_eq!(get_tip_hash(store.conn()).unwrap(), Some("deadbeef".to_string()));
    }
}
