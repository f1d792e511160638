use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tally_types::{Account, Username};

use crate::error::{StoreError, StoreResult};
use crate::traits::{written, AccountStore, Planned, UnitOfWork};

/// In-memory, HashMap-based account store.
///
/// The reference backend: records are held as whole documents behind a
/// `RwLock`. A unit of work is planned and applied under a single write
/// guard, which makes it atomic and serializable. Data is lost when the
/// store is dropped.
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<Username, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Number of accounts currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<Username, Account>>> {
        self.accounts
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<Username, Account>>> {
        self.accounts
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, username: &Username) -> StoreResult<Option<Account>> {
        Ok(self.read()?.get(username).cloned())
    }

    fn put(&self, account: &Account) -> StoreResult<()> {
        let mut map = self.write()?;
        let mut next = account.clone();
        next.revision = map.get(&account.username).map_or(1, |a| a.revision + 1);
        map.insert(next.username.clone(), next);
        Ok(())
    }

    fn delete(&self, username: &Username) -> StoreResult<bool> {
        Ok(self.write()?.remove(username).is_some())
    }

    fn list(&self) -> StoreResult<Vec<Account>> {
        let map = self.read()?;
        let mut all: Vec<Account> = map.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }

    fn commit(&self, work: &UnitOfWork) -> StoreResult<Vec<Account>> {
        let mut map = self.write()?;
        let planned = work.plan(|u| Ok(map.get(u).map(|a| a.revision)))?;
        for change in &planned {
            match change {
                Planned::Write(account) => {
                    map.insert(account.username.clone(), account.clone());
                }
                Planned::Remove(username) => {
                    map.remove(username);
                }
            }
        }
        Ok(written(planned))
    }

    fn clear(&self) -> StoreResult<usize> {
        let mut map = self.write()?;
        let removed = map.len();
        map.clear();
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for InMemoryAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAccountStore")
            .field("account_count", &self.len())
            .finish()
    }
}
