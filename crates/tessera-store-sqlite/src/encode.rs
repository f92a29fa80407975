//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 with a fixed nine-digit fraction and a `Z` suffix,
//! so they compare correctly as text and round-trip losslessly. UUIDs are
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use tessera_core::{event::VerificationEvent, identity::Identity, token::TokenHash};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const EVENT_COLUMNS: &str = "event_id, address, token_hash, identity_id, attempts, \
   last_attempt_at, expired, expired_at, created_at, version";

/// Raw values read directly from a `verification_events` row, in
/// [`EVENT_COLUMNS`] order.
pub struct RawEvent {
  pub event_id:        String,
  pub address:         String,
  pub token_hash:      String,
  pub identity_id:     Option<String>,
  pub attempts:        i64,
  pub last_attempt_at: Option<String>,
  pub expired:         bool,
  pub expired_at:      Option<String>,
  pub created_at:      String,
  pub version:         i64,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:        row.get(0)?,
      address:         row.get(1)?,
      token_hash:      row.get(2)?,
      identity_id:     row.get(3)?,
      attempts:        row.get(4)?,
      last_attempt_at: row.get(5)?,
      expired:         row.get(6)?,
      expired_at:      row.get(7)?,
      created_at:      row.get(8)?,
      version:         row.get(9)?,
    })
  }

  pub fn into_event(self) -> Result<VerificationEvent> {
    let attempts = u32::try_from(self.attempts)
      .map_err(|_| Error::Corrupt(format!("attempts out of range: {}", self.attempts)))?;
    let version = u64::try_from(self.version)
      .map_err(|_| Error::Corrupt(format!("version out of range: {}", self.version)))?;

    Ok(VerificationEvent {
      event_id: decode_uuid(&self.event_id)?,
      address: self.address,
      token_hash: TokenHash::from_hex(self.token_hash),
      identity_id: self.identity_id.as_deref().map(decode_uuid).transpose()?,
      attempts,
      last_attempt_at: self.last_attempt_at.as_deref().map(decode_dt).transpose()?,
      expired: self.expired,
      expired_at: self.expired_at.as_deref().map(decode_dt).transpose()?,
      created_at: decode_dt(&self.created_at)?,
      version,
    })
  }
}

/// Column values for writing a [`VerificationEvent`], owned so they can be
/// moved onto the connection thread.
pub struct EventParams {
  pub event_id:        String,
  pub address:         String,
  pub token_hash:      String,
  pub identity_id:     Option<String>,
  pub attempts:        i64,
  pub last_attempt_at: Option<String>,
  pub expired:         bool,
  pub expired_at:      Option<String>,
  pub created_at:      String,
  /// Version the caller read.
  pub expected:        i64,
}

impl EventParams {
  pub fn from_event(event: &VerificationEvent) -> Result<Self> {
    let expected = i64::try_from(event.version)
      .map_err(|_| Error::Corrupt(format!("version out of range: {}", event.version)))?;

    Ok(Self {
      event_id: encode_uuid(event.event_id),
      address: event.address.clone(),
      token_hash: event.token_hash.as_str().to_owned(),
      identity_id: event.identity_id.map(encode_uuid),
      attempts: i64::from(event.attempts),
      last_attempt_at: event.last_attempt_at.map(encode_dt),
      expired: event.expired,
      expired_at: event.expired_at.map(encode_dt),
      created_at: encode_dt(event.created_at),
      expected,
    })
  }
}

/// Raw values read directly from an `identities` row.
pub struct RawIdentity {
  pub identity_id: String,
  pub address:     String,
  pub created_at:  String,
}

impl RawIdentity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      identity_id: row.get(0)?,
      address:     row.get(1)?,
      created_at:  row.get(2)?,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      identity_id: decode_uuid(&self.identity_id)?,
      address:     self.address,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}
