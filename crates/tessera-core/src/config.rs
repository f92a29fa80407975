//! Verification policy, deserialised from the `[verification]` table of the
//! operator configuration and passed explicitly to
//! [`VerificationService::new`](crate::service::VerificationService::new).

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Deserializer};

use crate::{Error, Result};

/// Smallest accepted token size: 128 bits.
pub const MIN_ENTROPY_BYTES: usize = 16;
/// Upper bound to keep tokens URL-sized.
pub const MAX_ENTROPY_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
  /// Age after which an unredeemed event auto-expires. Seconds on the wire.
  #[serde(deserialize_with = "duration_from_secs")]
  pub token_ttl:           Duration,
  /// Redemption attempts allowed before the event is forcibly expired.
  pub max_attempts:        u32,
  /// Bytes of CSPRNG output per token.
  pub token_entropy_bytes: usize,
}

impl Default for VerificationConfig {
  fn default() -> Self {
    Self {
      token_ttl:           Duration::from_secs(60 * 60),
      max_attempts:        5,
      token_entropy_bytes: 32,
    }
  }
}

impl VerificationConfig {
  pub fn validate(&self) -> Result<()> {
    if self.token_ttl.is_zero() {
      return Err(Error::InvalidConfig("token_ttl must be positive".into()));
    }
    let ttl = chrono::TimeDelta::from_std(self.token_ttl).map_err(|_| {
      Error::InvalidConfig(format!("token_ttl of {}s is out of range", self.token_ttl.as_secs()))
    })?;
    if Utc::now().checked_add_signed(ttl).is_none() {
      return Err(Error::InvalidConfig(format!(
        "token_ttl of {}s overflows the calendar",
        self.token_ttl.as_secs()
      )));
    }
    if self.token_entropy_bytes < MIN_ENTROPY_BYTES {
      return Err(Error::InvalidConfig(format!(
        "token_entropy_bytes must be at least {MIN_ENTROPY_BYTES}, got {}",
        self.token_entropy_bytes
      )));
    }
    if self.token_entropy_bytes > MAX_ENTROPY_BYTES {
      return Err(Error::InvalidConfig(format!(
        "token_entropy_bytes must be at most {MAX_ENTROPY_BYTES}, got {}",
        self.token_entropy_bytes
      )));
    }
    Ok(())
  }

  /// The TTL as a `chrono` duration, saturating at the maximum representable
  /// value.
  pub fn ttl(&self) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(self.token_ttl).unwrap_or(chrono::TimeDelta::MAX)
  }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
  D: Deserializer<'de>,
{
  u64::deserialize(deserializer).map(Duration::from_secs)
}
