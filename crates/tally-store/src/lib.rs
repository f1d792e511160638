//! Account storage for the Tally ledger.
//!
//! Every backend implements the [`AccountStore`] trait: keyed get/put/delete
//! of whole [`Account`](tally_types::Account) records plus an atomic
//! [`UnitOfWork`] commit used for transfers. Business logic above this crate
//! never changes with the backend.
//!
//! # Storage Backends
//!
//! - [`InMemoryAccountStore`] -- `HashMap` documents for tests and embedding
//! - [`JournalAccountStore`] -- flat file, append-only CRC-framed journal
//! - [`SledAccountStore`] -- sled key-value database
//!
//! # Design Rules
//!
//! 1. Every write increments the record's revision.
//! 2. A unit of work is checked and applied inside one exclusive section;
//!    it either fully applies or leaves the store unchanged.
//! 3. Stale revisions surface as [`StoreError::Conflict`]; callers re-read
//!    and retry.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod journal;
pub mod kv;
pub mod memory;
pub mod traits;

#[cfg(test)]
mod conformance;

pub use error::{StoreError, StoreResult};
pub use journal::{
    JournalAccountStore, JournalConfig, JournalRecord, SyncMode, DEFAULT_COMPACT_AFTER_FRAMES,
};
pub use kv::SledAccountStore;
pub use memory::InMemoryAccountStore;
pub use traits::{AccountStore, Mutation, Planned, UnitOfWork};
