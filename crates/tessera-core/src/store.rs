//! The `VerificationStore` trait and its write outcomes.
//!
//! The trait is implemented by storage backends ([`crate::memory::MemoryStore`]
//! here, `tessera-store-sqlite` for durable storage). The service depends on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{event::VerificationEvent, identity::Identity, token::TokenHash};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`VerificationStore::save_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
  /// The write landed. Carries the event as stored, with its bumped
  /// `version`.
  Saved(VerificationEvent),
  /// The stored version no longer matches; someone else wrote first.
  Stale,
  /// Insert refused because another event already uses this token hash.
  DuplicateToken,
}

/// Result of [`VerificationStore::create_identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityInsert {
  Created(Identity),
  /// The address is already taken; the caller should fetch the existing row.
  DuplicateAddress,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Persistence for the verification ledger and the identity store.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait VerificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Find the event whose token hashes to `token_hash`.
  fn find_event_by_token<'a>(
    &'a self,
    token_hash: &'a TokenHash,
  ) -> impl Future<Output = Result<Option<VerificationEvent>, Self::Error>> + Send + 'a;

  fn get_event(
    &self,
    event_id: Uuid,
  ) -> impl Future<Output = Result<Option<VerificationEvent>, Self::Error>> + Send + '_;

  /// All events issued for `address`, newest first.
  fn list_events<'a>(
    &'a self,
    address: &'a str,
  ) -> impl Future<Output = Result<Vec<VerificationEvent>, Self::Error>> + Send + 'a;

  /// Upsert `event` atomically.
  ///
  /// - No row with `event.event_id`: insert it at version `event.version + 1`,
  ///   or return [`SaveOutcome::DuplicateToken`] if the hash is taken.
  /// - Otherwise: overwrite every mutable field only if the stored version
  ///   equals `event.version`, bumping it; else [`SaveOutcome::Stale`].
  fn save_event<'a>(
    &'a self,
    event: &'a VerificationEvent,
  ) -> impl Future<Output = Result<SaveOutcome, Self::Error>> + Send + 'a;

  /// Delete expired events whose `expired_at` is strictly before `before`.
  /// Returns the number of rows removed.
  fn purge_expired(
    &self,
    before: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Identities ────────────────────────────────────────────────────────

  fn find_identity_by_address<'a>(
    &'a self,
    address: &'a str,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + 'a;

  fn get_identity(
    &self,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Create an identity for an already-normalised `address`, stamped with
  /// `created_at`.
  fn create_identity<'a>(
    &'a self,
    address: &'a str,
    created_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<IdentityInsert, Self::Error>> + Send + 'a;
}
