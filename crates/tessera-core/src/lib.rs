//! Core types, the store trait, and the verification service for Tessera,
//! passwordless email verification.
//!
//! This crate is free of database and HTTP dependencies. Storage backends
//! implement [`store::VerificationStore`]; callers drive
//! [`service::VerificationService`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod address;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod memory;
pub mod service;
pub mod store;
pub mod token;

pub use config::VerificationConfig;
pub use error::{Error, Result};
pub use service::{IssuedVerification, Redemption, VerificationService};
