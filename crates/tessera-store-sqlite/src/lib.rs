//! SQLite backend for the Tessera verification ledger and identity store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every trait call is one closure on that
//! thread, so the read-check-write of [`SqliteStore::save_event`] is atomic.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
