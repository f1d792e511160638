//! Foundation types for the Tally account ledger.
//!
//! Every other Tally crate depends on `tally-types`. The types here carry
//! their own validation so that a value that exists is a value that is
//! well-formed: a [`Username`] is never empty, a [`Credential`] never
//! prints its secret.
//!
//! # Key Types
//!
//! - [`Username`] -- Unique, case-sensitive account key
//! - [`Credential`] -- Raw secret presented for authentication (redacted `Debug`)
//! - [`CredentialHash`] -- Salted one-way hash stored in place of the secret
//! - [`Account`] -- The persisted ledger record
//! - [`AccountSummary`] -- Public view of an account (no credential material)
//! - [`TransferReceipt`] -- Post-transfer state of both parties

pub mod account;
pub mod credential;
pub mod error;
pub mod username;

pub use account::{
    Account, AccountSummary, TransferReceipt, DEFAULT_ADMIN_TOKENS, DEFAULT_BALANCE,
    DEFAULT_TOKENS,
};
pub use credential::{Credential, CredentialHash, MAX_CREDENTIAL_LEN};
pub use error::TypeError;
pub use username::{Username, MAX_USERNAME_LEN};
