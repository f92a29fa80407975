//! Integration tests for `SqliteStore` against an in-memory database.

use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use tessera_core::{
  VerificationConfig, VerificationService,
  event::{Rejection, VerificationEvent},
  store::{IdentityInsert, SaveOutcome, VerificationStore},
  token::TokenHash,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn event(address: &str, token: &str) -> VerificationEvent {
  VerificationEvent::new(address.into(), TokenHash::of(token), None, Utc::now())
}

fn saved(outcome: SaveOutcome) -> VerificationEvent {
  match outcome {
    SaveOutcome::Saved(ev) => ev,
    other => panic!("expected Saved, got {other:?}"),
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_find_by_token() {
  let s = store().await;
  let ev = saved(s.save_event(&event("a@example.com", "t1")).await.unwrap());
  assert_eq!(ev.version, 1);

  let fetched = s.find_event_by_token(&TokenHash::of("t1")).await.unwrap();
  assert_eq!(fetched, Some(ev.clone()));

  let by_id = s.get_event(ev.event_id).await.unwrap();
  assert_eq!(by_id, Some(ev));
}

#[tokio::test]
async fn find_missing_returns_none() {
  let s = store().await;
  assert!(s.find_event_by_token(&TokenHash::of("nope")).await.unwrap().is_none());
  assert!(s.get_event(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn update_persists_every_mutable_field() {
  let s = store().await;
  let identity = match s.create_identity("a@example.com", Utc::now()).await.unwrap() {
    IdentityInsert::Created(identity) => identity,
    other => panic!("unexpected {other:?}"),
  };
  let v1 = saved(s.save_event(&event("a@example.com", "t1")).await.unwrap());

  let now = Utc::now();
  let mut changed = v1.clone();
  changed.attempts = 2;
  changed.last_attempt_at = Some(now);
  changed.expire(now);
  changed.identity_id = Some(identity.identity_id);

  let v2 = saved(s.save_event(&changed).await.unwrap());
  assert_eq!(v2.version, 2);

  let stored = s.get_event(v1.event_id).await.unwrap().unwrap();
  assert_eq!(stored, v2);
  assert_eq!(stored.attempts, 2);
  assert!(stored.expired);
  assert_eq!(stored.expired_at, Some(now));
  assert_eq!(stored.last_attempt_at, Some(now));
  assert_eq!(stored.identity_id, Some(identity.identity_id));
}

#[tokio::test]
async fn stale_write_is_refused() {
  let s = store().await;
  let v1 = saved(s.save_event(&event("a@example.com", "t1")).await.unwrap());

  let mut first = v1.clone();
  first.attempts = 1;
  let mut second = v1.clone();
  second.attempts = 1;
  second.expire(Utc::now());

  saved(s.save_event(&first).await.unwrap());
  assert_eq!(s.save_event(&second).await.unwrap(), SaveOutcome::Stale);

  let stored = s.get_event(v1.event_id).await.unwrap().unwrap();
  assert!(!stored.expired);
  assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn duplicate_token_hash_is_refused() {
  let s = store().await;
  saved(s.save_event(&event("a@example.com", "same")).await.unwrap());
  assert_eq!(
    s.save_event(&event("b@example.com", "same")).await.unwrap(),
    SaveOutcome::DuplicateToken
  );
}

#[tokio::test]
async fn list_events_newest_first_for_one_address() {
  let s = store().await;
  let now = Utc::now();

  let mut older = event("a@example.com", "t1");
  older.created_at = now - TimeDelta::minutes(10);
  let mut newer = event("a@example.com", "t2");
  newer.created_at = now;
  let other = event("b@example.com", "t3");

  for ev in [&older, &newer, &other] {
    saved(s.save_event(ev).await.unwrap());
  }

  let listed = s.list_events("a@example.com").await.unwrap();
  let ids: Vec<_> = listed.iter().map(|ev| ev.event_id).collect();
  assert_eq!(ids, vec![newer.event_id, older.event_id]);
}

#[tokio::test]
async fn purge_drops_only_old_expired_events() {
  let s = store().await;
  let now = Utc::now();

  let mut old = event("a@example.com", "old");
  old.expire(now - TimeDelta::days(30));
  let mut recent = event("a@example.com", "recent");
  recent.expire(now - TimeDelta::minutes(5));
  let active = event("a@example.com", "active");

  for ev in [&old, &recent, &active] {
    saved(s.save_event(ev).await.unwrap());
  }

  let removed = s.purge_expired(now - TimeDelta::days(1)).await.unwrap();
  assert_eq!(removed, 1);
  assert!(s.get_event(old.event_id).await.unwrap().is_none());
  assert!(s.get_event(recent.event_id).await.unwrap().is_some());
  assert!(s.get_event(active.event_id).await.unwrap().is_some());
}

// ─── Identities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_find_identity() {
  let s = store().await;
  let created = match s.create_identity("a@example.com", Utc::now()).await.unwrap() {
    IdentityInsert::Created(identity) => identity,
    other => panic!("unexpected {other:?}"),
  };

  let by_address = s.find_identity_by_address("a@example.com").await.unwrap();
  assert_eq!(by_address.as_ref(), Some(&created));

  let by_id = s.get_identity(created.identity_id).await.unwrap();
  assert_eq!(by_id, Some(created));

  assert!(s.find_identity_by_address("b@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_identity_address_is_reported() {
  let s = store().await;
  s.create_identity("a@example.com", Utc::now()).await.unwrap();
  assert_eq!(
    s.create_identity("a@example.com", Utc::now()).await.unwrap(),
    IdentityInsert::DuplicateAddress
  );
}

// ─── Service over SQLite ─────────────────────────────────────────────────────

fn service(s: SqliteStore) -> VerificationService<SqliteStore> {
  let config = VerificationConfig {
    token_ttl:           Duration::from_secs(3600),
    max_attempts:        3,
    token_entropy_bytes: 32,
  };
  VerificationService::new(Arc::new(s), config).expect("valid config")
}

#[tokio::test]
async fn service_round_trip_persists_identity_and_expiry() {
  let svc = service(store().await);
  let issued = svc.start_verification("User@Example.com").await.unwrap();

  let redemption = svc.redeem_token(&issued.token).await.unwrap();
  let identity = redemption.identity().cloned().expect("verified");
  assert_eq!(identity.address, "user@example.com");

  let stored = svc.store().get_event(issued.event.event_id).await.unwrap().unwrap();
  assert!(stored.expired);
  assert_eq!(stored.attempts, 1);
  assert_eq!(stored.identity_id, Some(identity.identity_id));

  let again = svc.redeem_token(&issued.token).await.unwrap();
  assert_eq!(again.rejection(), Some(Rejection::EventExpired));
}

#[tokio::test]
async fn service_ttl_expiry_is_written_back() {
  let svc = service(store().await);
  let t0 = Utc::now();
  let issued = svc.start_verification_at("a@example.com", t0).await.unwrap();

  let late = t0 + TimeDelta::hours(3);
  let redemption = svc.redeem_token_at(&issued.token, late).await.unwrap();
  assert_eq!(redemption.rejection(), Some(Rejection::EventExpired));

  let stored = svc.store().get_event(issued.event.event_id).await.unwrap().unwrap();
  assert!(stored.expired);
  assert_eq!(stored.expired_at, Some(late));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn service_concurrent_redemptions_succeed_once() {
  let svc = service(store().await);
  let issued = svc.start_verification("a@example.com").await.unwrap();

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let svc = svc.clone();
      let token = issued.token.clone();
      tokio::spawn(async move { svc.redeem_token(&token).await })
    })
    .collect();

  let mut successes = 0;
  for handle in handles {
    if handle.await.unwrap().unwrap().did_verify() {
      successes += 1;
    }
  }
  assert_eq!(successes, 1);

  let stored = svc.store().get_event(issued.event.event_id).await.unwrap().unwrap();
  assert_eq!(stored.attempts, 8);
}

#[tokio::test]
async fn store_survives_reopen() {
  let dir = std::env::temp_dir().join(format!("tessera-test-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("ledger.db");

  let token = {
    let svc = service(SqliteStore::open(&path).await.unwrap());
    svc.start_verification("a@example.com").await.unwrap().token
  };

  let svc = service(SqliteStore::open(&path).await.unwrap());
  assert!(svc.redeem_token(&token).await.unwrap().did_verify());

  std::fs::remove_dir_all(&dir).ok();
}
