//! Key-value account store on top of sled.
//!
//! Each account is one JSON document under its username in the `accounts`
//! tree. Units of work run as a single sled transaction, which retries
//! internally on write-write conflicts and aborts with the first failed
//! revision check.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use tally_types::{Account, Username};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{written, AccountStore, Planned, UnitOfWork};

const ACCOUNTS_TREE: &str = "accounts";

/// Account store persisted in a sled database.
pub struct SledAccountStore {
    db: sled::Db,
    accounts: sled::Tree,
}

impl SledAccountStore {
    /// Open (or create) a database directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = sled::open(path).map_err(backend)?;
        Self::from_db(db)
    }

    /// A throwaway database removed when dropped.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(backend)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        let accounts = db.open_tree(ACCOUNTS_TREE).map_err(backend)?;
        Ok(Self { db, accounts })
    }
}

fn backend(e: sled::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode(account: &Account) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(account).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> StoreResult<Account> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn abort(e: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(e)
}

fn settle<T>(result: Result<T, TransactionError<StoreError>>) -> StoreResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(backend(e)),
    }
}

impl AccountStore for SledAccountStore {
    fn get(&self, username: &Username) -> StoreResult<Option<Account>> {
        match self.accounts.get(username.as_str()).map_err(backend)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, account: &Account) -> StoreResult<()> {
        let key = account.username.as_str().as_bytes();
        settle(self.accounts.transaction(|tx| {
            let revision = match tx.get(key)? {
                Some(bytes) => decode(&bytes).map_err(abort)?.revision + 1,
                None => 1,
            };
            let mut next = account.clone();
            next.revision = revision;
            tx.insert(key, encode(&next).map_err(abort)?)?;
            Ok(())
        }))
    }

    fn delete(&self, username: &Username) -> StoreResult<bool> {
        Ok(self
            .accounts
            .remove(username.as_str())
            .map_err(backend)?
            .is_some())
    }

    fn list(&self) -> StoreResult<Vec<Account>> {
        // sled iterates in byte order of the key, which is the username order.
        self.accounts
            .iter()
            .values()
            .map(|v| decode(&v.map_err(backend)?))
            .collect()
    }

    fn commit(&self, work: &UnitOfWork) -> StoreResult<Vec<Account>> {
        let records = settle(self.accounts.transaction(|tx| {
            let mut lookup_err = None;
            let planned = work.plan(|u| match tx.get(u.as_str()) {
                Ok(Some(bytes)) => Ok(Some(decode(&bytes)?.revision)),
                Ok(None) => Ok(None),
                Err(e) => {
                    lookup_err = Some(e);
                    Err(StoreError::Unavailable("transaction interrupted".into()))
                }
            });
            if let Some(e) = lookup_err {
                return Err(e.into());
            }
            let planned = planned.map_err(abort)?;
            for change in &planned {
                match change {
                    Planned::Write(account) => {
                        tx.insert(account.username.as_str(), encode(account).map_err(abort)?)?;
                    }
                    Planned::Remove(username) => {
                        tx.remove(username.as_str())?;
                    }
                }
            }
            Ok(written(planned))
        }))?;
        debug!(records = records.len(), "sled commit");
        Ok(records)
    }

    /// Removes key by key and counts what was actually removed, so a record
    /// deleted concurrently is not counted twice. A record inserted after the
    /// scan passes its key survives.
    fn clear(&self) -> StoreResult<usize> {
        let mut removed = 0;
        for key in self.accounts.iter().keys() {
            if self.accounts.remove(key.map_err(backend)?).map_err(backend)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

impl std::fmt::Debug for SledAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledAccountStore")
            .field("accounts", &self.accounts.len())
            .finish()
    }
}
