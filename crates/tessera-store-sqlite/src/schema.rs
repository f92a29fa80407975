//! SQL schema for the Tessera SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per verified address. Never deleted.
CREATE TABLE IF NOT EXISTS identities (
    identity_id TEXT PRIMARY KEY,
    address     TEXT NOT NULL UNIQUE,  -- normalised
    created_at  TEXT NOT NULL
);

-- One row per issued token. Expiry is a flag; rows only go away on purge.
CREATE TABLE IF NOT EXISTS verification_events (
    event_id        TEXT PRIMARY KEY,
    address         TEXT NOT NULL,
    token_hash      TEXT NOT NULL UNIQUE,  -- hex SHA-256 of the raw token
    identity_id     TEXT REFERENCES identities(identity_id) ON DELETE SET NULL,
    attempts        INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
    last_attempt_at TEXT,
    expired         INTEGER NOT NULL DEFAULT 0 CHECK (expired IN (0, 1)),
    expired_at      TEXT,
    created_at      TEXT NOT NULL,
    version         INTEGER NOT NULL       -- optimistic concurrency
);

CREATE INDEX IF NOT EXISTS events_address_idx ON verification_events(address);
CREATE INDEX IF NOT EXISTS events_expired_idx ON verification_events(expired, expired_at);

PRAGMA user_version = 1;
";
