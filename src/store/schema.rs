//! SQL schema for the persistence layout.
//!
//! Table and column names are normative (the `LIKE txid || '%'` cascading
//! delete in `engine::ingest::delete_transaction` depends on `jig.location`
//! and `berry.location` starting with the owning txid's hex).

/// Schema as of `user_version = 1`. `bytes` is hex-encoded text, matching
/// the original on-disk layout this crate must stay able to open; `migrate`
/// rewrites it to a binary column when stepping a version-1 store to 2.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE tx (
    txid        TEXT PRIMARY KEY,
    height      INTEGER,
    time        INTEGER,
    bytes       TEXT,
    has_code    INTEGER,
    executable  INTEGER NOT NULL DEFAULT 0,
    executed    INTEGER NOT NULL DEFAULT 0,
    indexed     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_tx_txid ON tx(txid);
CREATE INDEX idx_tx_height ON tx(height);

CREATE TABLE deps (
    up   TEXT NOT NULL,
    down TEXT NOT NULL,
    UNIQUE(up, down)
);
CREATE INDEX idx_deps_up ON deps(up);
CREATE INDEX idx_deps_down ON deps(down);

CREATE TABLE jig (
    location   TEXT PRIMARY KEY,
    state      TEXT,
    class      TEXT,
    lock       TEXT,
    scripthash TEXT
);
CREATE INDEX idx_jig_class ON jig(class);

CREATE TABLE berry (
    location TEXT PRIMARY KEY,
    state    TEXT
);

CREATE TABLE spends (
    location    TEXT PRIMARY KEY,
    spend_txid  TEXT
);

CREATE TABLE trust (
    txid  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE ban (
    txid TEXT PRIMARY KEY
);

CREATE TABLE crawl (
    role   TEXT UNIQUE NOT NULL,
    height INTEGER,
    hash   TEXT
);
INSERT INTO crawl (role, height, hash) VALUES ('tip', NULL, NULL);
"#;
