//! Shared fixtures for the crate's tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tally_crypto::HashCost;
use tally_store::{AccountStore, InMemoryAccountStore, StoreError, StoreResult, UnitOfWork};
use tally_types::{Account, Username};

use crate::bootstrap::BootstrapOutcome;
use crate::config::LedgerConfig;
use crate::service::LedgerService;

pub fn fast_config() -> LedgerConfig {
    LedgerConfig {
        hash_cost: HashCost::insecure_fast(),
        max_commit_attempts: 64,
        ..Default::default()
    }
}

pub fn ledger() -> LedgerService {
    LedgerService::new(Arc::new(InMemoryAccountStore::new()), fast_config()).unwrap()
}

/// A ledger with the admin seeded; returns the admin's generated credential.
pub fn seeded() -> (LedgerService, String) {
    let svc = ledger();
    match svc.bootstrap().ensure_admin_seeded().unwrap() {
        BootstrapOutcome::Seeded {
            generated_credential: Some(credential),
            ..
        } => (svc, credential),
        other => panic!("expected a fresh seed, got {other:?}"),
    }
}

/// In-memory store whose writes can be switched to fail, or raced by a
/// delete that lands between a caller's read and its commit.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryAccountStore,
    fail: AtomicBool,
    delete_before_commit: Mutex<Option<Username>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Remove `username` right before the next commit is applied.
    pub fn delete_before_next_commit(&self, username: Username) {
        if let Ok(mut pending) = self.delete_before_commit.lock() {
            *pending = Some(username);
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

impl AccountStore for FailingStore {
    fn get(&self, username: &Username) -> StoreResult<Option<Account>> {
        self.inner.get(username)
    }

    fn put(&self, account: &Account) -> StoreResult<()> {
        self.check()?;
        self.inner.put(account)
    }

    fn delete(&self, username: &Username) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete(username)
    }

    fn list(&self) -> StoreResult<Vec<Account>> {
        self.inner.list()
    }

    fn commit(&self, work: &UnitOfWork) -> StoreResult<Vec<Account>> {
        self.check()?;
        let raced = self.delete_before_commit.lock().ok().and_then(|mut p| p.take());
        if let Some(username) = raced {
            self.inner.delete(&username)?;
        }
        self.inner.commit(work)
    }

    fn clear(&self) -> StoreResult<usize> {
        self.check()?;
        self.inner.clear()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
