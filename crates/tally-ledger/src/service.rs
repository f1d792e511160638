use std::sync::Arc;

use tally_crypto::CredentialHasher;
use tally_store::{AccountStore, StoreError, UnitOfWork};
use tally_types::{Account, AccountSummary, TransferReceipt, Username};
use tracing::{debug, info, warn};

use crate::admin::AdminOperations;
use crate::bootstrap::Bootstrap;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::validation::{
    apply_transfer, check_amount, check_distinct, ensure_consistent, parse_credential,
    parse_username,
};

/// User-facing ledger operations over an [`AccountStore`].
///
/// Cheap to clone; clones share the store, hasher and configuration. Every
/// write goes through a revision-checked [`UnitOfWork`] and is retried from
/// a fresh read when it loses a race, so concurrent callers never lose an
/// update or spend the same tokens twice.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<CredentialHasher>,
    config: Arc<LedgerConfig>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn AccountStore>, config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let hasher = CredentialHasher::new(config.hash_cost)?;
        Ok(Self {
            store,
            hasher: Arc::new(hasher),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub(crate) fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Privileged operations sharing this service's store.
    pub fn admin(&self) -> AdminOperations {
        AdminOperations::new(self.clone())
    }

    pub fn bootstrap(&self) -> Bootstrap {
        Bootstrap::new(self.clone())
    }

    /// Register a new user with default holdings.
    pub fn create_account(&self, username: &str, credential: &str) -> LedgerResult<AccountSummary> {
        let username = parse_username(username)?;
        let credential = parse_credential(credential)?;
        if username.as_str() == self.config.admin_username {
            return Err(LedgerError::InvalidInput(format!(
                "username {username} is reserved"
            )));
        }
        if self.store.exists(&username)? {
            return Err(LedgerError::DuplicateUsername(username));
        }

        let hash = self.hasher.hash(&credential)?;
        let account = Account::new_user(username, hash);
        let written = self.store.commit(&UnitOfWork::new().create(account))?;
        let created = first(written)?;
        info!(username = %created.username, "account created");
        Ok(created.summary())
    }

    /// Check a credential and return the matching account.
    ///
    /// An unknown username and a wrong credential fail identically and take
    /// the same time.
    pub fn authenticate(&self, username: &str, credential: &str) -> LedgerResult<Account> {
        let username = parse_username(username)?;
        let credential = parse_credential(credential)?;
        match self.store.get(&username)? {
            Some(account) if self.hasher.verify(&credential, &account.credential_hash)? => {
                debug!(username = %username, "authenticated");
                Ok(account)
            }
            Some(_) => {
                debug!(username = %username, "credential mismatch");
                Err(LedgerError::InvalidCredentials)
            }
            None => {
                self.hasher.verify_dummy(&credential);
                debug!(username = %username, "authentication for unknown user");
                Err(LedgerError::InvalidCredentials)
            }
        }
    }

    pub fn get_account(&self, username: &str) -> LedgerResult<AccountSummary> {
        let username = parse_username(username)?;
        Ok(self.load(&username)?.summary())
    }

    /// Move `amount` tokens from `from` to `to` as one atomic unit.
    ///
    /// An admin sender is not debited. Fails without touching either account
    /// on any validation, sufficiency or storage error.
    pub fn transfer(&self, from: &str, to: &str, amount: i64) -> LedgerResult<TransferReceipt> {
        let from = parse_username(from)?;
        let to = parse_username(to)?;
        check_amount(amount)?;
        check_distinct(&from, &to)?;

        for attempt in 1..=self.config.max_commit_attempts {
            let mut sender = self.load(&from)?;
            let mut recipient = self.load(&to)?;
            let debited = apply_transfer(&mut sender, &mut recipient, amount)?;
            ensure_consistent(&sender)?;
            ensure_consistent(&recipient)?;

            // The sender is rewritten even when not debited, so the commit
            // fails if it was changed or deleted after the read.
            let work = UnitOfWork::new().update(sender).update(recipient);

            match self.store.commit(&work) {
                Ok(written) => {
                    let mut written = written.into_iter();
                    let sender = next(&mut written)?;
                    let recipient = next(&mut written)?;
                    info!(
                        from = %from,
                        to = %to,
                        amount,
                        debited,
                        "transfer committed"
                    );
                    return Ok(TransferReceipt {
                        from: sender.summary(),
                        to: recipient.summary(),
                        amount,
                        debited,
                    });
                }
                Err(e) if e.is_conflict() => {
                    debug!(from = %from, to = %to, attempt, "transfer lost a revision race; retrying");
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(from = %from, to = %to, "transfer abandoned under contention");
        Err(contended(self.config.max_commit_attempts))
    }

    /// Replace a user's credential after checking the current one.
    pub fn change_credential(&self, username: &str, current: &str, new: &str) -> LedgerResult<()> {
        let account = self.authenticate(username, current)?;
        let new = parse_credential(new)?;
        let hash = self.hasher.hash(&new)?;
        self.modify(&account.username, |a| {
            a.credential_hash = hash.clone();
            a.must_rotate_credential = false;
            Ok(())
        })?;
        info!(username = %account.username, "credential changed");
        Ok(())
    }

    pub(crate) fn load(&self, username: &Username) -> LedgerResult<Account> {
        self.store
            .get(username)?
            .ok_or_else(|| LedgerError::UserNotFound(username.clone()))
    }

    /// Delete an account at the revision it was read at, retried on
    /// conflicts. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, username: &Username) -> LedgerResult<bool> {
        for attempt in 1..=self.config.max_commit_attempts {
            let Some(account) = self.store.get(username)? else {
                return Ok(false);
            };
            match self
                .store
                .commit(&UnitOfWork::new().delete(username.clone(), account.revision))
            {
                Ok(_) => return Ok(true),
                Err(StoreError::NotFound(_)) => return Ok(false),
                Err(e) if e.is_conflict() => {
                    debug!(username = %username, attempt, "delete lost a revision race; retrying");
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(contended(self.config.max_commit_attempts))
    }

    /// Read-modify-write of a single account, retried on revision conflicts.
    pub(crate) fn modify<F>(&self, username: &Username, mut change: F) -> LedgerResult<Account>
    where
        F: FnMut(&mut Account) -> LedgerResult<()>,
    {
        for attempt in 1..=self.config.max_commit_attempts {
            let mut account = self.load(username)?;
            change(&mut account)?;
            ensure_consistent(&account)?;
            match self.store.commit(&UnitOfWork::new().update(account)) {
                Ok(written) => return first(written),
                Err(e) if e.is_conflict() => {
                    debug!(username = %username, attempt, "update lost a revision race; retrying");
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(contended(self.config.max_commit_attempts))
    }
}

fn contended(attempts: u32) -> LedgerError {
    LedgerError::StorageUnavailable(format!(
        "gave up after {attempts} conflicting commit attempts"
    ))
}

fn first(written: Vec<Account>) -> LedgerResult<Account> {
    next(&mut written.into_iter())
}

fn next(written: &mut impl Iterator<Item = Account>) -> LedgerResult<Account> {
    written.next().ok_or_else(|| {
        LedgerError::from(StoreError::Backend("commit returned fewer records than written".into()))
    })
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("backend", &self.store.backend_name())
            .field("admin_username", &self.config.admin_username)
            .finish()
    }
}
