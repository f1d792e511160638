use serde::{Deserialize, Serialize};
use tally_crypto::HashCost;
use tally_types::DEFAULT_ADMIN_TOKENS;

use crate::error::{LedgerError, LedgerResult};

/// Configuration for the ledger service and its bootstrap.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Well-known username of the bootstrap admin. Reserved: signup rejects it.
    pub admin_username: String,
    /// Initial admin credential. When unset, bootstrap generates a random
    /// one and hands it back once.
    pub admin_credential: Option<String>,
    /// Tokens granted to the admin at seeding.
    pub admin_tokens: i64,
    /// How many times a write is re-read and retried after losing an
    /// optimistic revision race before giving up as unavailable.
    pub max_commit_attempts: u32,
    /// Argon2id cost for new credential hashes.
    pub hash_cost: HashCost,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".into(),
            admin_credential: None,
            admin_tokens: DEFAULT_ADMIN_TOKENS,
            max_commit_attempts: 16,
            hash_cost: HashCost::default(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.admin_tokens < 0 {
            return Err(LedgerError::InvalidInput(
                "admin_tokens must not be negative".into(),
            ));
        }
        if self.max_commit_attempts == 0 {
            return Err(LedgerError::InvalidInput(
                "max_commit_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
