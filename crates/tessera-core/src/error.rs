//! Error types for `tessera-core`.
//!
//! Policy outcomes of a redemption (unknown token, expiry, attempt
//! exhaustion) are not errors; they are reported as
//! [`Rejection`](crate::event::Rejection)s inside a
//! [`Redemption`](crate::service::Redemption).

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid email address: {0:?}")]
  InvalidAddress(String),

  /// A concurrent creator already holds this address. The service resolves
  /// this by re-fetching; it never reaches callers of `redeem_token`.
  #[error("an identity already exists for {0:?}")]
  DuplicateAddress(String),

  #[error("event {0} kept changing underneath the redemption")]
  Contended(Uuid),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("random number generator failure: {0}")]
  Rng(String),

  #[error("store error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn storage<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
