//! `tessera` — operator CLI for passwordless email verification.
//!
//! Reads `tessera.toml` (or the path given with `--config`), overlays
//! `TESSERA_*` environment variables, and opens the SQLite ledger.
//!
//! ```
//! tessera issue alice@example.com
//! tessera redeem <token>
//! tessera --json events alice@example.com
//! tessera purge --older-than-days 7
//! ```

mod commands;
mod settings;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use commands::{Command, Format};
use settings::Settings;
use tessera_core::VerificationService;
use tessera_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tessera", version, about = "Passwordless email verification")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tessera.toml", env = "TESSERA_CONFIG")]
  config: PathBuf,

  /// Print results as JSON.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let svc = VerificationService::new(Arc::new(store), settings.verification)
    .context("invalid verification settings")?;

  let format = if cli.json { Format::Json } else { Format::Text };
  let mut stdout = std::io::stdout().lock();
  let ok = commands::run(&svc, cli.command, format, &mut stdout).await?;

  Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
