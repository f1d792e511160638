use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::CredentialHash;
use crate::username::Username;

/// Balance given to every newly created account.
pub const DEFAULT_BALANCE: i64 = 100;
/// Token holdings of a newly created (non-admin) account.
pub const DEFAULT_TOKENS: i64 = 0;
/// Token holdings of the bootstrap admin account.
pub const DEFAULT_ADMIN_TOKENS: i64 = 1_000_000_000_000;

/// The persisted ledger record.
///
/// `revision` is owned by the storage layer: `0` means the record has never
/// been written, and every committed write increments it. Business logic
/// reads it only to hand it back to the store for optimistic conflict
/// detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: Username,
    pub credential_hash: CredentialHash,
    pub balance: i64,
    pub tokens: i64,
    pub is_admin: bool,
    /// The holder must replace their credential (bootstrap default or an
    /// admin-issued reset).
    #[serde(default)]
    pub must_rotate_credential: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

impl Account {
    /// A fresh, never-persisted user account with default holdings.
    pub fn new_user(username: Username, credential_hash: CredentialHash) -> Self {
        Self {
            username,
            credential_hash,
            balance: DEFAULT_BALANCE,
            tokens: DEFAULT_TOKENS,
            is_admin: false,
            must_rotate_credential: false,
            created_at: Utc::now(),
            revision: 0,
        }
    }

    /// A fresh admin account holding `tokens` tokens.
    pub fn new_admin(username: Username, credential_hash: CredentialHash, tokens: i64) -> Self {
        Self {
            tokens,
            is_admin: true,
            must_rotate_credential: true,
            ..Self::new_user(username, credential_hash)
        }
    }

    /// Admins are exempt from the sufficiency check on outgoing transfers.
    pub fn has_unlimited_funds(&self) -> bool {
        self.is_admin
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary::from(self)
    }
}

/// Public view of an account. Never carries credential material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub username: Username,
    pub balance: i64,
    pub tokens: i64,
    pub is_admin: bool,
    pub must_rotate_credential: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            balance: account.balance,
            tokens: account.tokens,
            is_admin: account.is_admin,
            must_rotate_credential: account.must_rotate_credential,
            created_at: account.created_at,
        }
    }
}

/// Result of a committed transfer: both parties as they stand afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from: AccountSummary,
    pub to: AccountSummary,
    pub amount: i64,
    /// `false` when the sender holds the unlimited-funds capability and was
    /// not debited.
    pub debited: bool,
}
