//! Layered configuration: optional TOML file, then `TESSERA_*` environment
//! variables.
//!
//! ```toml
//! store_path = "~/.local/share/tessera/tessera.db"
//!
//! [verification]
//! token_ttl           = 3600   # seconds
//! max_attempts        = 5
//! token_entropy_bytes = 32
//! ```
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `TESSERA_VERIFICATION__MAX_ATTEMPTS=3`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tessera_core::VerificationConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:   PathBuf,
  pub verification: VerificationConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("tessera.db"),
      verification: VerificationConfig::default(),
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(
        config::Environment::with_prefix("TESSERA")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Settings = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
