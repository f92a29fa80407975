//! [`MemoryStore`] — an in-process [`VerificationStore`].
//!
//! Every operation runs under a single mutex, so each trait call is atomic.
//! Nothing survives the process; use it for tests and embedding.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  event::VerificationEvent,
  identity::Identity,
  store::{IdentityInsert, SaveOutcome, VerificationStore},
  token::TokenHash,
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("memory store lock poisoned")]
  Poisoned,
}

#[derive(Default)]
struct Inner {
  events:           HashMap<Uuid, VerificationEvent>,
  events_by_token:  HashMap<TokenHash, Uuid>,
  identities:       HashMap<Uuid, Identity>,
  identity_by_addr: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> Result<MutexGuard<'_, Inner>, MemoryError> {
    self.inner.lock().map_err(|_| MemoryError::Poisoned)
  }
}

impl VerificationStore for MemoryStore {
  type Error = MemoryError;

  async fn find_event_by_token(
    &self,
    token_hash: &TokenHash,
  ) -> Result<Option<VerificationEvent>, MemoryError> {
    let inner = self.lock()?;
    Ok(
      inner
        .events_by_token
        .get(token_hash)
        .and_then(|id| inner.events.get(id))
        .cloned(),
    )
  }

  async fn get_event(
    &self,
    event_id: Uuid,
  ) -> Result<Option<VerificationEvent>, MemoryError> {
    Ok(self.lock()?.events.get(&event_id).cloned())
  }

  async fn list_events(
    &self,
    address: &str,
  ) -> Result<Vec<VerificationEvent>, MemoryError> {
    let inner = self.lock()?;
    let mut events: Vec<_> = inner
      .events
      .values()
      .filter(|ev| ev.address == address)
      .cloned()
      .collect();
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(events)
  }

  async fn save_event(
    &self,
    event: &VerificationEvent,
  ) -> Result<SaveOutcome, MemoryError> {
    let mut inner = self.lock()?;

    let mut stored = event.clone();
    stored.version = event.version + 1;

    let current = inner
      .events
      .get(&event.event_id)
      .map(|c| (c.version, c.token_hash == event.token_hash));

    match current {
      // The token hash is immutable once issued.
      Some((version, same_token)) if version != event.version || !same_token => {
        return Ok(SaveOutcome::Stale);
      }
      Some(_) => {}
      None => {
        if inner.events_by_token.contains_key(&event.token_hash) {
          return Ok(SaveOutcome::DuplicateToken);
        }
        inner
          .events_by_token
          .insert(event.token_hash.clone(), event.event_id);
      }
    }

    inner.events.insert(event.event_id, stored.clone());
    Ok(SaveOutcome::Saved(stored))
  }

  async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, MemoryError> {
    let mut inner = self.lock()?;
    let doomed: Vec<(Uuid, TokenHash)> = inner
      .events
      .values()
      .filter(|ev| ev.expired && ev.expired_at.is_some_and(|at| at < before))
      .map(|ev| (ev.event_id, ev.token_hash.clone()))
      .collect();

    for (id, hash) in &doomed {
      inner.events.remove(id);
      inner.events_by_token.remove(hash);
    }
    Ok(doomed.len() as u64)
  }

  async fn find_identity_by_address(
    &self,
    address: &str,
  ) -> Result<Option<Identity>, MemoryError> {
    let inner = self.lock()?;
    Ok(
      inner
        .identity_by_addr
        .get(address)
        .and_then(|id| inner.identities.get(id))
        .cloned(),
    )
  }

  async fn get_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, MemoryError> {
    Ok(self.lock()?.identities.get(&identity_id).cloned())
  }

  async fn create_identity(
    &self,
    address: &str,
    created_at: DateTime<Utc>,
  ) -> Result<IdentityInsert, MemoryError> {
    let mut inner = self.lock()?;
    if inner.identity_by_addr.contains_key(address) {
      return Ok(IdentityInsert::DuplicateAddress);
    }

    let identity = Identity::new(address.to_owned(), created_at);
    inner
      .identity_by_addr
      .insert(identity.address.clone(), identity.identity_id);
    inner.identities.insert(identity.identity_id, identity.clone());
    Ok(IdentityInsert::Created(identity))
  }
}
