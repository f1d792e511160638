use serde::Serialize;
use tally_types::{Account, AccountSummary};
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::service::LedgerService;
use crate::validation::{parse_credential, parse_username};

/// The exact token [`AdminOperations::wipe_all`] requires before it clears
/// the store.
pub const WIPE_CONFIRMATION: &str = "yes";

/// What [`AdminOperations::wipe_all`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WipeOutcome {
    /// The confirmation token did not match; nothing was removed.
    NotConfirmed,
    Wiped { removed: usize },
}

/// Privileged operations.
///
/// Every call names its caller and is authorized from the caller's persisted
/// `is_admin` flag. The caller is expected to have been authenticated by the
/// surrounding layer. Unknown or non-admin callers get
/// [`LedgerError::PermissionDenied`] before any argument is inspected.
#[derive(Clone, Debug)]
pub struct AdminOperations {
    ledger: LedgerService,
}

impl AdminOperations {
    pub(crate) fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    fn require_admin(&self, caller: &str) -> LedgerResult<Account> {
        let username = parse_username(caller).map_err(|_| LedgerError::PermissionDenied)?;
        match self.ledger.store().get(&username)? {
            Some(account) if account.is_admin => Ok(account),
            _ => {
                warn!(caller = %username, "privileged operation refused");
                Err(LedgerError::PermissionDenied)
            }
        }
    }

    /// All accounts, sorted by username.
    pub fn list_accounts(&self, caller: &str) -> LedgerResult<Vec<AccountSummary>> {
        self.require_admin(caller)?;
        Ok(self
            .ledger
            .store()
            .list()?
            .iter()
            .map(Account::summary)
            .collect())
    }

    /// Overwrite a user's credential. The user must rotate it on next use.
    pub fn reset_password(&self, caller: &str, target: &str, new_credential: &str) -> LedgerResult<()> {
        let admin = self.require_admin(caller)?;
        let target = parse_username(target)?;
        let credential = parse_credential(new_credential)?;
        let hash = self.ledger.hasher().hash(&credential)?;
        self.ledger.modify(&target, |a| {
            a.credential_hash = hash.clone();
            a.must_rotate_credential = true;
            Ok(())
        })?;
        info!(admin = %admin.username, target = %target, "credential reset");
        Ok(())
    }

    /// Zero a user's token holdings.
    pub fn reset_tokens(&self, caller: &str, target: &str) -> LedgerResult<AccountSummary> {
        let admin = self.require_admin(caller)?;
        let target = parse_username(target)?;
        let written = self.ledger.modify(&target, |a| {
            a.tokens = 0;
            Ok(())
        })?;
        info!(admin = %admin.username, target = %target, "tokens reset");
        Ok(written.summary())
    }

    /// Remove an account. Returns `false` if it did not exist.
    ///
    /// The delete commits against the revision just read, so it cannot land
    /// between another unit of work's read and its commit.
    pub fn delete_account(&self, caller: &str, target: &str) -> LedgerResult<bool> {
        let admin = self.require_admin(caller)?;
        let target = parse_username(target)?;
        let removed = self.ledger.remove(&target)?;
        if target == admin.username {
            warn!(admin = %admin.username, "admin deleted its own account");
        }
        info!(admin = %admin.username, target = %target, removed, "account deleted");
        Ok(removed)
    }

    /// Remove every account, the caller's included, but only when
    /// `confirmation` equals [`WIPE_CONFIRMATION`].
    pub fn wipe_all(&self, caller: &str, confirmation: &str) -> LedgerResult<WipeOutcome> {
        let admin = self.require_admin(caller)?;
        if confirmation != WIPE_CONFIRMATION {
            info!(admin = %admin.username, "wipe not confirmed; nothing removed");
            return Ok(WipeOutcome::NotConfirmed);
        }
        let removed = self.ledger.store().clear()?;
        warn!(admin = %admin.username, removed, "all accounts wiped");
        Ok(WipeOutcome::Wiped { removed })
    }
}
