//! Subcommand handlers. Each writes its report to `out`, either as aligned
//! text or as one JSON document.

use std::{io::Write, time::Duration};

use anyhow::Context as _;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Subcommand;
use serde::Serialize;
use tessera_core::{
  Redemption, VerificationService, event::VerificationEvent, store::VerificationStore,
};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Issue a verification token for an email address.
  Issue {
    /// The address to verify.
    address: String,
  },

  /// Redeem a token taken from a verification link.
  Redeem {
    token: String,
  },

  /// List stored verification events for an address, newest first.
  Events {
    address: String,
  },

  /// Delete events that expired more than N days ago.
  Purge {
    #[arg(long, value_name = "N", default_value_t = 30)]
    older_than_days: u64,
  },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
  Text,
  Json,
}

/// Run `command` and report on `out`. Returns `false` when a token was
/// rejected, so the caller can exit non-zero.
pub async fn run<S: VerificationStore>(
  svc: &VerificationService<S>,
  command: Command,
  format: Format,
  out: &mut impl Write,
) -> anyhow::Result<bool> {
  match command {
    Command::Issue { address } => {
      let issued = svc.start_verification(&address).await?;
      match format {
        Format::Json => write_json(out, &issued)?,
        Format::Text => {
          let expires = issued
            .event
            .created_at
            .checked_add_signed(svc.config().ttl())
            .map(stamp)
            .unwrap_or_else(|| "never".into());
          writeln!(out, "token:    {}", issued.token)?;
          writeln!(out, "event:    {}", issued.event.event_id)?;
          writeln!(out, "address:  {}", issued.event.address)?;
          writeln!(out, "expires:  {expires}")?;
        }
      }
      Ok(true)
    }

    Command::Redeem { token } => {
      let redemption = svc.redeem_token(&token).await?;
      let verified = redemption.did_verify();
      match format {
        Format::Json => write_json(out, &redemption)?,
        Format::Text => match &redemption {
          Redemption::Verified { identity, .. } => {
            writeln!(out, "{}", redemption.message())?;
            writeln!(out, "identity: {} ({})", identity.identity_id, identity.address)?;
          }
          Redemption::Rejected { reason, .. } => {
            writeln!(out, "{} [{reason}]", redemption.message())?;
          }
        },
      }
      Ok(verified)
    }

    Command::Events { address } => {
      let events = svc.events_for(&address).await?;
      match format {
        Format::Json => write_json(out, &events)?,
        Format::Text if events.is_empty() => writeln!(out, "no events")?,
        Format::Text => {
          for event in &events {
            writeln!(out, "{}", event_line(event))?;
          }
        }
      }
      Ok(true)
    }

    Command::Purge { older_than_days } => {
      let older_than = Duration::from_secs(older_than_days.saturating_mul(SECONDS_PER_DAY));
      let removed = svc.purge_expired(older_than).await?;
      match format {
        Format::Json => write_json(out, &serde_json::json!({ "removed": removed }))?,
        Format::Text => writeln!(out, "removed {removed} expired event(s)")?,
      }
      Ok(true)
    }
  }
}

// ─── Formatting ──────────────────────────────────────────────────────────────

fn write_json(out: &mut impl Write, value: &impl Serialize) -> anyhow::Result<()> {
  serde_json::to_writer_pretty(&mut *out, value).context("failed to encode JSON")?;
  writeln!(out)?;
  Ok(())
}

fn stamp(at: DateTime<Utc>) -> String { at.to_rfc3339_opts(SecondsFormat::Secs, true) }

fn event_line(event: &VerificationEvent) -> String {
  let state = if event.is_active() { "active" } else { "expired" };
  let identity = event
    .identity_id
    .map(|id| id.to_string())
    .unwrap_or_else(|| "-".into());
  format!(
    "{}  {}  {:<7}  attempts={}  identity={}",
    event.event_id,
    stamp(event.created_at),
    state,
    event.attempts,
    identity,
  )
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use tessera_core::{Error, VerificationConfig, memory::MemoryStore};

  use super::*;

  fn service() -> VerificationService<MemoryStore> {
    VerificationService::new(Arc::new(MemoryStore::new()), VerificationConfig::default())
      .unwrap()
  }

  async fn run_to_string(
    svc: &VerificationService<MemoryStore>,
    command: Command,
    format: Format,
  ) -> (bool, String) {
    let mut out = Vec::new();
    let ok = run(svc, command, format, &mut out).await.unwrap();
    (ok, String::from_utf8(out).unwrap())
  }

  fn token_from(text: &str) -> String {
    text
      .lines()
      .find_map(|line| line.strip_prefix("token:"))
      .map(|t| t.trim().to_owned())
      .expect("token line")
  }

  fn events(address: &str) -> Command {
    Command::Events {
      address: address.into(),
    }
  }

  #[tokio::test]
  async fn issue_then_redeem_as_text() {
    let svc = service();
    let (ok, issued) = run_to_string(
      &svc,
      Command::Issue {
        address: "User@Example.com".into(),
      },
      Format::Text,
    )
    .await;
    assert!(ok);
    assert!(issued.contains("address:  user@example.com"));

    let token = token_from(&issued);
    let redeem = Command::Redeem {
      token: token.clone(),
    };
    let (ok, redeemed) = run_to_string(&svc, redeem, Format::Text).await;
    assert!(ok);
    assert!(redeemed.starts_with("Email verified. Welcome!"));

    let (ok, again) = run_to_string(&svc, Command::Redeem { token }, Format::Text).await;
    assert!(!ok);
    assert_eq!(again.trim(), "Invalid or expired link [event_expired]");
  }

  #[tokio::test]
  async fn issue_prints_expiry_one_ttl_after_creation() {
    let svc = service();
    let issued = svc.start_verification("a@example.com").await.unwrap();
    let expected = issued.event.created_at + svc.config().ttl();

    let (_, out) = run_to_string(
      &svc,
      Command::Issue {
        address: "a@example.com".into(),
      },
      Format::Text,
    )
    .await;
    let expires = out
      .lines()
      .find_map(|line| line.strip_prefix("expires:"))
      .map(str::trim)
      .expect("expires line");
    let expires = DateTime::parse_from_rfc3339(expires).unwrap();
    let slack = (expires.with_timezone(&Utc) - expected).num_seconds().abs();
    assert!(slack < 60, "expiry {expires} far from {expected}");
  }

  #[test]
  fn calendar_overflowing_ttl_is_refused_before_any_command_runs() {
    let config = VerificationConfig {
      token_ttl: Duration::from_secs(10_000_000_000_000),
      ..Default::default()
    };
    let result = VerificationService::new(Arc::new(MemoryStore::new()), config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
  }

  #[tokio::test]
  async fn redeem_as_json_carries_outcome_tag() {
    let svc = service();
    let issued = svc.start_verification("a@example.com").await.unwrap();

    let redeem = Command::Redeem {
      token: issued.token,
    };
    let (ok, out) = run_to_string(&svc, redeem, Format::Json).await;
    assert!(ok);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["outcome"], "verified");
    assert_eq!(value["identity"]["address"], "a@example.com");

    let redeem = Command::Redeem {
      token: "bogus".into(),
    };
    let (ok, out) = run_to_string(&svc, redeem, Format::Json).await;
    assert!(!ok);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["outcome"], "rejected");
    assert_eq!(value["reason"], "token_not_found");
  }

  #[tokio::test]
  async fn events_lists_each_event() {
    let svc = service();
    let (_, empty) = run_to_string(&svc, events("a@example.com"), Format::Text).await;
    assert_eq!(empty.trim(), "no events");

    svc.start_verification("a@example.com").await.unwrap();
    svc.start_verification("a@example.com").await.unwrap();

    let (_, listed) = run_to_string(&svc, events("a@example.com"), Format::Text).await;
    assert_eq!(listed.lines().count(), 2);
    assert!(
      listed
        .lines()
        .all(|line| line.contains("active") && line.contains("attempts=0"))
    );
  }

  #[tokio::test]
  async fn purge_reports_count() {
    let svc = service();
    let purge = Command::Purge { older_than_days: 7 };
    let (ok, out) = run_to_string(&svc, purge, Format::Json).await;
    assert!(ok);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["removed"], 0);
  }

  #[tokio::test]
  async fn invalid_address_is_an_error() {
    let svc = service();
    let mut out = Vec::new();
    let issue = Command::Issue {
      address: "nobody".into(),
    };
    let result = run(&svc, issue, Format::Text, &mut out).await;
    assert!(result.is_err());
  }
}
