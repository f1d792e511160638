//! Ledger logic for Tally.
//!
//! [`LedgerService`] is the single entry point. It owns an
//! [`AccountStore`](tally_store::AccountStore) and a
//! [`CredentialHasher`](tally_crypto::CredentialHasher), and hands out
//! [`AdminOperations`] and [`Bootstrap`] views over the same state.
//!
//! # Invariants
//!
//! - A non-admin account never holds negative tokens.
//! - A transfer between two non-admin accounts conserves the sum of their
//!   tokens, and is applied entirely or not at all.
//! - Credentials are only ever persisted as Argon2id hashes.
//! - Privilege is decided by the persisted `is_admin` flag, never by name.

pub mod admin;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod service;
pub mod validation;

#[cfg(test)]
mod testing;

pub use admin::{AdminOperations, WipeOutcome, WIPE_CONFIRMATION};
pub use bootstrap::{Bootstrap, BootstrapOutcome};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use service::LedgerService;
