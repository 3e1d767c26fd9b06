//! `user_version`-driven schema migrations: each step is idempotent and
//! the current version is read back to decide what still needs to run.

use rusqlite::Connection;
use tracing::info;

use super::schema::SCHEMA_V1;
use super::StoreError;

/// Highest schema version this build knows how to reach.
pub const CURRENT_VERSION: i64 = 2;

pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let mut version = user_version(conn)?;

    if version == 0 {
        conn.execute_batch(SCHEMA_V1)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
        info!("initialized schema at user_version 1");
    }

    if version == 1 {
        migrate_v1_to_v2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
        info!("migrated schema to user_version 2");
    }

    if version != CURRENT_VERSION {
        return Err(StoreError::UnknownSchemaVersion(version));
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<i64, StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Replace the hex-encoded `tx.bytes` column with a binary one and compact
/// the file. Runs inside the same write transaction as the rest of
/// `migrate` by virtue of being one `execute_batch` plus a prepared
/// statement loop — no nested transaction, per the single-writer rule.
fn migrate_v1_to_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE tx_v2 (
            txid        TEXT PRIMARY KEY,
            height      INTEGER,
            time        INTEGER,
            bytes       BLOB,
            has_code    INTEGER,
            executable  INTEGER NOT NULL DEFAULT 0,
            executed    INTEGER NOT NULL DEFAULT 0,
            indexed     INTEGER NOT NULL DEFAULT 0
        );",
    )?;

    {
        let mut select = conn.prepare(
            "SELECT txid, height, time, bytes, has_code, executable, executed, indexed FROM tx",
        )?;
        let mut insert = conn.prepare(
            "INSERT INTO tx_v2 (txid, height, time, bytes, has_code, executable, executed, indexed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let bytes_hex: Option<String> = row.get(3)?;
            let bytes: Option<Vec<u8>> = match bytes_hex {
                Some(hex_str) => Some(hex::decode(&hex_str).map_err(|e| {
                    crate::types::TxidParseError::InvalidHex(e)
                })?),
                None => None,
            };
            insert.execute(rusqlite::params![
                row.get::<_, String>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                bytes,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
            ])?;
        }
    }

    conn.execute_batch(
        "DROP TABLE tx;
         ALTER TABLE tx_v2 RENAME TO tx;
         CREATE INDEX idx_tx_txid ON tx(txid);
         CREATE INDEX idx_tx_height ON tx(height);
         VACUUM;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_fresh_database_to_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn migrating_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn v1_to_v2_converts_hex_bytes_to_blob() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.pragma_update(None, "user_version", 1i64).unwrap();
        conn.execute(
            "INSERT INTO tx (txid, bytes, executable, executed, indexed) VALUES (?1, ?2, 0, 0, 1)",
            rusqlite::params!["a".repeat(64), "deadbeef"],
        )
        .unwrap();

        migrate(&conn).unwrap();

        let bytes: Vec<u8> = conn
            .query_row("SELECT bytes FROM tx WHERE txid = ?1", ["a".repeat(64)], |r| r.get(0))
            .unwrap();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn seeds_single_crawl_tip_row() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM crawl", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
