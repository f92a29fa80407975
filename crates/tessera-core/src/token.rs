//! Verification token generation and hashing.
//!
//! The raw token only ever leaves the process in the outbound message; the
//! ledger stores its SHA-256 digest and looks events up by that digest.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Hex-encoded SHA-256 digest of a raw token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenHash(String);

impl TokenHash {
  /// Hash a raw token as presented by the user.
  pub fn of(token: &str) -> Self {
    let digest = Sha256::digest(token.as_bytes());
    Self(hex::encode(digest))
  }

  /// Wrap a digest that was already hex-encoded, e.g. read back from storage.
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for TokenHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Draw `entropy_bytes` bytes from the OS CSPRNG and encode them as URL-safe
/// base64 without padding.
pub fn generate(entropy_bytes: usize) -> Result<String> {
  let mut bytes = vec![0u8; entropy_bytes];
  OsRng
    .try_fill_bytes(&mut bytes)
    .map_err(|e| Error::Rng(e.to_string()))?;
  Ok(URL_SAFE_NO_PAD.encode(bytes))
}
