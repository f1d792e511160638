//! Credential hashing for the Tally account ledger.
//!
//! Credentials are stored only as salted Argon2id hashes in PHC string
//! format and verified in constant time. Nothing here implements custom
//! cryptography; it wraps the `argon2` crate with the ledger's types.

pub mod error;
pub mod hasher;
pub mod secret;

pub use error::CryptoError;
pub use hasher::{CredentialHasher, HashCost};
pub use secret::generate_secret;
