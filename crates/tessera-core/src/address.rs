//! Email address normalisation and the minimal syntax check the service
//! applies before trusting caller input.

use crate::{Error, Result};

/// Trim surrounding whitespace and lowercase the whole address.
///
/// The local part is lowercased too, so `Alice@x.com` and `alice@x.com` map
/// to the same identity.
pub fn normalize(address: &str) -> String { address.trim().to_lowercase() }

/// `true` if `address` looks like `local@domain` with no whitespace.
pub fn is_plausible(address: &str) -> bool {
  let Some((local, domain)) = address.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.is_empty()
    && !domain.contains('@')
    && !address.chars().any(char::is_whitespace)
}

/// Normalise `address` and reject it with [`Error::InvalidAddress`] if it is
/// not plausible.
pub fn parse(address: &str) -> Result<String> {
  let normalized = normalize(address);
  if is_plausible(&normalized) {
    Ok(normalized)
  } else {
    Err(Error::InvalidAddress(address.to_owned()))
  }
}
