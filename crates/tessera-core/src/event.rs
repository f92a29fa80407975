//! Verification events and the redemption state machine.
//!
//! ```text
//!  [active] --(age > ttl)----------> [expired]
//!  [active] --(attempts > max)-----> [expired]
//!  [active] --(successful redeem)--> [expired, identity linked]
//!  [expired] --(any attempt)-------> [expired]   attempts still increments
//! ```
//!
//! The transition itself is pure ([`VerificationEvent::register_attempt`]);
//! persisting it is the service's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::VerificationConfig, token::TokenHash};

/// Message shown to the user after a successful redemption.
pub const VERIFIED_MESSAGE: &str = "Email verified. Welcome!";

/// Message shown to the user for every rejection, whatever the reason.
pub const REJECTED_MESSAGE: &str = "Invalid or expired link";

// ─── Event ───────────────────────────────────────────────────────────────────

/// One issued, single-use token and its attempt/expiry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEvent {
  pub event_id:        Uuid,
  /// Normalised address the token was issued for.
  pub address:         String,
  pub token_hash:      TokenHash,
  /// Weak link to an [`Identity`](crate::identity::Identity); resolved by
  /// lookup, never owned.
  pub identity_id:     Option<Uuid>,
  /// Only ever increases.
  pub attempts:        u32,
  pub last_attempt_at: Option<DateTime<Utc>>,
  /// Once set, never cleared.
  pub expired:         bool,
  pub expired_at:      Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
  /// Optimistic-concurrency counter maintained by the store.
  pub version:         u64,
}

impl VerificationEvent {
  /// A fresh, active event that has not been persisted yet.
  pub fn new(
    address: String,
    token_hash: TokenHash,
    identity_id: Option<Uuid>,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      event_id: Uuid::new_v4(),
      address,
      token_hash,
      identity_id,
      attempts: 0,
      last_attempt_at: None,
      expired: false,
      expired_at: None,
      created_at,
      version: 0,
    }
  }

  pub fn is_active(&self) -> bool { !self.expired }

  /// Mark the event expired at `now`. A no-op if it already is.
  pub fn expire(&mut self, now: DateTime<Utc>) {
    if !self.expired {
      self.expired = true;
      self.expired_at = Some(now);
    }
  }

  /// Record one redemption attempt made at `now` and decide its outcome.
  ///
  /// Every call counts as an attempt, including calls against an event that
  /// is already expired. An accepted attempt also expires the event, which
  /// is what makes tokens single-use.
  pub fn register_attempt(
    &mut self,
    now: DateTime<Utc>,
    config: &VerificationConfig,
  ) -> AttemptVerdict {
    self.attempts = self.attempts.saturating_add(1);
    self.last_attempt_at = Some(now);

    if self.expired {
      return AttemptVerdict::Rejected(Rejection::EventExpired);
    }

    if now.signed_duration_since(self.created_at) > config.ttl() {
      self.expire(now);
      return AttemptVerdict::Rejected(Rejection::EventExpired);
    }

    if self.attempts > config.max_attempts {
      self.expire(now);
      return AttemptVerdict::Rejected(Rejection::TooManyAttempts);
    }

    self.expire(now);
    AttemptVerdict::Accepted
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why a redemption was refused. Used for logs; users only ever see
/// [`REJECTED_MESSAGE`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
  /// No event matches the presented token. Nothing is mutated.
  TokenNotFound,
  /// The event was already expired, or its TTL elapsed.
  EventExpired,
  /// The attempt counter went past `max_attempts`.
  TooManyAttempts,
}

impl Rejection {
  pub fn user_message(&self) -> &'static str { REJECTED_MESSAGE }
}

/// The result of [`VerificationEvent::register_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
  Accepted,
  Rejected(Rejection),
}
