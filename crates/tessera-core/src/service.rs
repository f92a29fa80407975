//! [`VerificationService`] — issues verification tokens and redeems them.
//!
//! Redemption is serialised per event with optimistic concurrency: the event
//! is read, the attempt is applied in memory, and the result is written back
//! only if nobody else wrote in between. A losing writer re-reads and
//! re-evaluates. Because an accepted attempt expires the event in that same
//! conditional write, at most one redemption of a token can ever succeed.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result, address,
  config::VerificationConfig,
  event::{AttemptVerdict, Rejection, VERIFIED_MESSAGE, VerificationEvent},
  identity::Identity,
  store::{IdentityInsert, SaveOutcome, VerificationStore},
  token::{self, TokenHash},
};

/// Fresh tokens drawn before giving up on a hash collision.
const TOKEN_RETRIES: usize = 4;

/// Conditional writes attempted against one event before reporting
/// [`Error::Contended`].
const WRITE_RETRIES: usize = 32;

// ─── Results ─────────────────────────────────────────────────────────────────

/// A newly issued event together with the raw token, which is not stored
/// anywhere and must be delivered to the user by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedVerification {
  pub event: VerificationEvent,
  pub token: String,
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Redemption {
  Verified {
    identity: Identity,
    event:    VerificationEvent,
  },
  Rejected {
    reason: Rejection,
    /// The event as persisted after this attempt; `None` for
    /// [`Rejection::TokenNotFound`].
    event:  Option<VerificationEvent>,
  },
}

impl Redemption {
  fn not_found() -> Self {
    Self::Rejected {
      reason: Rejection::TokenNotFound,
      event:  None,
    }
  }

  pub fn did_verify(&self) -> bool { matches!(self, Self::Verified { .. }) }

  /// The message to show the end user.
  pub fn message(&self) -> &'static str {
    match self {
      Self::Verified { .. } => VERIFIED_MESSAGE,
      Self::Rejected { reason, .. } => reason.user_message(),
    }
  }

  pub fn identity(&self) -> Option<&Identity> {
    match self {
      Self::Verified { identity, .. } => Some(identity),
      Self::Rejected { .. } => None,
    }
  }

  pub fn rejection(&self) -> Option<Rejection> {
    match self {
      Self::Verified { .. } => None,
      Self::Rejected { reason, .. } => Some(*reason),
    }
  }

  /// `(did_verify, message, identity)`.
  pub fn into_parts(self) -> (bool, &'static str, Option<Identity>) {
    let message = self.message();
    match self {
      Self::Verified { identity, .. } => (true, message, Some(identity)),
      Self::Rejected { .. } => (false, message, None),
    }
  }
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct VerificationService<S> {
  store:  Arc<S>,
  config: VerificationConfig,
}

impl<S> Clone for VerificationService<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      config: self.config.clone(),
    }
  }
}

impl<S: VerificationStore> VerificationService<S> {
  /// Build a service over `store`. Fails if `config` does not validate.
  pub fn new(store: Arc<S>, config: VerificationConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { store, config })
  }

  pub fn config(&self) -> &VerificationConfig { &self.config }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Issuance ──────────────────────────────────────────────────────────

  /// Issue a new verification token for `address`.
  pub async fn start_verification(&self, address: &str) -> Result<IssuedVerification> {
    self.start_verification_at(address, Utc::now()).await
  }

  /// [`start_verification`](Self::start_verification) with an explicit
  /// issuance time.
  pub async fn start_verification_at(
    &self,
    address: &str,
    now: DateTime<Utc>,
  ) -> Result<IssuedVerification> {
    let address = address::parse(address)?;

    let identity_id = self
      .store
      .find_identity_by_address(&address)
      .await
      .map_err(Error::storage)?
      .map(|identity| identity.identity_id);

    let mut last_event_id = Uuid::nil();
    for _ in 0..TOKEN_RETRIES {
      let token = token::generate(self.config.token_entropy_bytes)?;
      let event = VerificationEvent::new(
        address.clone(),
        TokenHash::of(&token),
        identity_id,
        now,
      );
      last_event_id = event.event_id;

      match self.store.save_event(&event).await.map_err(Error::storage)? {
        SaveOutcome::Saved(event) => {
          info!(
            event_id = %event.event_id,
            address = %event.address,
            known_identity = identity_id.is_some(),
            "issued verification token"
          );
          return Ok(IssuedVerification { event, token });
        }
        SaveOutcome::DuplicateToken | SaveOutcome::Stale => {
          warn!(event_id = %event.event_id, "token hash collision, drawing a new token");
        }
      }
    }

    Err(Error::Contended(last_event_id))
  }

  // ── Redemption ────────────────────────────────────────────────────────

  /// Redeem `token`. Policy failures come back as
  /// [`Redemption::Rejected`]; only storage trouble is an `Err`.
  pub async fn redeem_token(&self, token: &str) -> Result<Redemption> {
    self.redeem_token_at(token, Utc::now()).await
  }

  /// [`redeem_token`](Self::redeem_token) evaluated at `now`.
  pub async fn redeem_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Redemption> {
    let token = token.trim();
    if token.is_empty() {
      warn!(reason = %Rejection::TokenNotFound, "empty token presented");
      return Ok(Redemption::not_found());
    }

    let token_hash = TokenHash::of(token);
    let Some(mut event) = self
      .store
      .find_event_by_token(&token_hash)
      .await
      .map_err(Error::storage)?
    else {
      warn!(reason = %Rejection::TokenNotFound, "redemption rejected");
      return Ok(Redemption::not_found());
    };

    for _ in 0..WRITE_RETRIES {
      let mut attempt = event.clone();
      let verdict = attempt.register_attempt(now, &self.config);

      match self.store.save_event(&attempt).await.map_err(Error::storage)? {
        SaveOutcome::Saved(saved) => {
          return match verdict {
            AttemptVerdict::Accepted => self.complete(saved, now).await,
            AttemptVerdict::Rejected(reason) => {
              warn!(
                event_id = %saved.event_id,
                attempts = saved.attempts,
                %reason,
                "redemption rejected"
              );
              Ok(Redemption::Rejected {
                reason,
                event: Some(saved),
              })
            }
          };
        }
        SaveOutcome::Stale | SaveOutcome::DuplicateToken => {
          debug!(event_id = %event.event_id, "event changed concurrently, re-reading");
          match self.store.get_event(event.event_id).await.map_err(Error::storage)? {
            Some(current) => event = current,
            // Purged between the read and the write.
            None => return Ok(Redemption::not_found()),
          }
        }
      }
    }

    Err(Error::Contended(event.event_id))
  }

  /// Resolve the identity for an accepted event and link it.
  async fn complete(&self, event: VerificationEvent, now: DateTime<Utc>) -> Result<Redemption> {
    let identity = self.resolve_identity(&event, now).await?;
    let event = self.link_identity(event, identity.identity_id).await?;

    info!(
      event_id = %event.event_id,
      identity_id = %identity.identity_id,
      "verification succeeded"
    );
    Ok(Redemption::Verified { identity, event })
  }

  async fn resolve_identity(
    &self,
    event: &VerificationEvent,
    now: DateTime<Utc>,
  ) -> Result<Identity> {
    if let Some(id) = event.identity_id
      && let Some(identity) = self.store.get_identity(id).await.map_err(Error::storage)?
    {
      return Ok(identity);
    }

    if let Some(identity) = self.find_identity(&event.address).await? {
      return Ok(identity);
    }

    match self
      .store
      .create_identity(&event.address, now)
      .await
      .map_err(Error::storage)?
    {
      IdentityInsert::Created(identity) => {
        info!(identity_id = %identity.identity_id, address = %identity.address, "created identity");
        Ok(identity)
      }
      IdentityInsert::DuplicateAddress => {
        debug!(address = %event.address, "identity created concurrently, linking to it");
        self
          .find_identity(&event.address)
          .await?
          .ok_or_else(|| Error::DuplicateAddress(event.address.clone()))
      }
    }
  }

  async fn find_identity(&self, address: &str) -> Result<Option<Identity>> {
    self
      .store
      .find_identity_by_address(address)
      .await
      .map_err(Error::storage)
  }

  /// Persist `identity_id` on the event, re-reading if later attempts against
  /// the (already expired) event raced the write.
  async fn link_identity(
    &self,
    mut event: VerificationEvent,
    identity_id: Uuid,
  ) -> Result<VerificationEvent> {
    for _ in 0..WRITE_RETRIES {
      if event.identity_id == Some(identity_id) {
        return Ok(event);
      }
      let mut linked = event.clone();
      linked.identity_id = Some(identity_id);

      match self.store.save_event(&linked).await.map_err(Error::storage)? {
        SaveOutcome::Saved(saved) => return Ok(saved),
        SaveOutcome::Stale | SaveOutcome::DuplicateToken => {
          match self.store.get_event(event.event_id).await.map_err(Error::storage)? {
            Some(current) => event = current,
            None => return Ok(linked),
          }
        }
      }
    }

    Err(Error::Contended(event.event_id))
  }

  // ── Lookups & hygiene ─────────────────────────────────────────────────

  /// Load an identity by id, e.g. one remembered in a session.
  pub async fn identity(&self, identity_id: Uuid) -> Result<Option<Identity>> {
    self
      .store
      .get_identity(identity_id)
      .await
      .map_err(Error::storage)
  }

  /// Every stored event for `address`, newest first.
  pub async fn events_for(&self, address: &str) -> Result<Vec<VerificationEvent>> {
    let address = address::parse(address)?;
    self
      .store
      .list_events(&address)
      .await
      .map_err(Error::storage)
  }

  /// Delete events that expired more than `older_than` ago.
  pub async fn purge_expired(&self, older_than: Duration) -> Result<u64> {
    self.purge_expired_at(older_than, Utc::now()).await
  }

  pub async fn purge_expired_at(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64> {
    let cutoff = TimeDelta::from_std(older_than)
      .ok()
      .and_then(|age| now.checked_sub_signed(age))
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let removed = self
      .store
      .purge_expired(cutoff)
      .await
      .map_err(Error::storage)?;
    info!(removed, %cutoff, "purged expired verification events");
    Ok(removed)
  }
}
