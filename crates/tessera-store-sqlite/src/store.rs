//! [`SqliteStore`] — the SQLite implementation of [`VerificationStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension as _};
use uuid::Uuid;

use tessera_core::{
  event::VerificationEvent,
  identity::Identity,
  store::{IdentityInsert, SaveOutcome, VerificationStore},
  token::TokenHash,
};

use crate::{
  Result,
  encode::{EVENT_COLUMNS, EventParams, RawEvent, RawIdentity, encode_dt, encode_uuid},
  error::Error,
  schema::SCHEMA,
};

/// `true` for UNIQUE / PRIMARY KEY constraint failures.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == ErrorCode::ConstraintViolation
        && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
          || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
  )
}

/// What happened to a write on the connection thread, before the event is
/// re-assembled on the async side.
enum Written {
  Saved,
  Stale,
  DuplicateToken,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tessera store backed by a single SQLite file.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a private in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch at most one event matching `column = value`.
  async fn query_event(
    &self,
    column: &'static str,
    value: String,
  ) -> Result<Option<VerificationEvent>> {
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM verification_events WHERE {column} = ?1"),
            rusqlite::params![value],
            RawEvent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }

  async fn query_identity(
    &self,
    column: &'static str,
    value: String,
  ) -> Result<Option<Identity>> {
    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT identity_id, address, created_at FROM identities WHERE {column} = ?1"
            ),
            rusqlite::params![value],
            RawIdentity::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }
}

// ─── VerificationStore impl ──────────────────────────────────────────────────

impl VerificationStore for SqliteStore {
  type Error = Error;

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn find_event_by_token(&self, token_hash: &TokenHash) -> Result<Option<VerificationEvent>> {
    self
      .query_event("token_hash", token_hash.as_str().to_owned())
      .await
  }

  async fn get_event(&self, event_id: Uuid) -> Result<Option<VerificationEvent>> {
    self.query_event("event_id", encode_uuid(event_id)).await
  }

  async fn list_events(&self, address: &str) -> Result<Vec<VerificationEvent>> {
    let address = address.to_owned();

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM verification_events
           WHERE address = ?1
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![address], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn save_event(&self, event: &VerificationEvent) -> Result<SaveOutcome> {
    let p = EventParams::from_event(event)?;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Conditional update: only the holder of the current version wins.
        let updated = tx.execute(
          "UPDATE verification_events
           SET identity_id     = ?2,
               attempts        = ?3,
               last_attempt_at = ?4,
               expired         = ?5,
               expired_at      = ?6,
               version         = version + 1
           WHERE event_id = ?1 AND version = ?7 AND token_hash = ?8",
          rusqlite::params![
            p.event_id,
            p.identity_id,
            p.attempts,
            p.last_attempt_at,
            p.expired,
            p.expired_at,
            p.expected,
            p.token_hash,
          ],
        )?;

        let written = if updated == 1 {
          Written::Saved
        } else {
          let exists = tx
            .query_row(
              "SELECT 1 FROM verification_events WHERE event_id = ?1",
              rusqlite::params![p.event_id],
              |_| Ok(()),
            )
            .optional()?
            .is_some();

          if exists {
            Written::Stale
          } else {
            let inserted = tx.execute(
              "INSERT INTO verification_events (
                 event_id, address, token_hash, identity_id, attempts,
                 last_attempt_at, expired, expired_at, created_at, version
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10 + 1)",
              rusqlite::params![
                p.event_id,
                p.address,
                p.token_hash,
                p.identity_id,
                p.attempts,
                p.last_attempt_at,
                p.expired,
                p.expired_at,
                p.created_at,
                p.expected,
              ],
            );
            match inserted {
              Ok(_) => Written::Saved,
              Err(e) if is_unique_violation(&e) => Written::DuplicateToken,
              Err(e) => return Err(e.into()),
            }
          }
        };

        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(match written {
      Written::Saved => {
        let mut saved = event.clone();
        saved.version = event.version + 1;
        SaveOutcome::Saved(saved)
      }
      Written::Stale => SaveOutcome::Stale,
      Written::DuplicateToken => SaveOutcome::DuplicateToken,
    })
  }

  async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
    let before_str = encode_dt(before);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM verification_events
           WHERE expired = 1 AND expired_at IS NOT NULL AND expired_at < ?1",
          rusqlite::params![before_str],
        )?)
      })
      .await?;

    Ok(removed as u64)
  }

  // ── Identities ────────────────────────────────────────────────────────────

  async fn find_identity_by_address(&self, address: &str) -> Result<Option<Identity>> {
    self.query_identity("address", address.to_owned()).await
  }

  async fn get_identity(&self, identity_id: Uuid) -> Result<Option<Identity>> {
    self
      .query_identity("identity_id", encode_uuid(identity_id))
      .await
  }

  async fn create_identity(
    &self,
    address: &str,
    created_at: DateTime<Utc>,
  ) -> Result<IdentityInsert> {
    let identity = Identity::new(address.to_owned(), created_at);

    let id_str      = encode_uuid(identity.identity_id);
    let address_str = identity.address.clone();
    let at_str      = encode_dt(identity.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO identities (identity_id, address, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, address_str, at_str],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(if inserted {
      IdentityInsert::Created(identity)
    } else {
      IdentityInsert::DuplicateAddress
    })
  }
}
