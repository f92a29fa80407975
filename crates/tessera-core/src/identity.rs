//! Identity — a verified email address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The durable outcome of a successful verification. Created the first time a
/// token for its address is redeemed; never deleted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub identity_id: Uuid,
  /// Normalised address; unique across all identities.
  pub address:     String,
  pub created_at:  DateTime<Utc>,
}

impl Identity {
  pub fn new(address: String, created_at: DateTime<Utc>) -> Self {
    Self {
      identity_id: Uuid::new_v4(),
      address,
      created_at,
    }
  }
}
