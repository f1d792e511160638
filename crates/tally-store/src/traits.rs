use std::collections::HashSet;

use tally_types::{Account, Username};

use crate::error::{StoreError, StoreResult};

/// One record change inside a [`UnitOfWork`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Insert a new record. Fails with [`StoreError::AlreadyExists`] if the
    /// username is taken.
    Create(Account),
    /// Overwrite an existing record. Fails with [`StoreError::Conflict`]
    /// unless the stored revision equals `account.revision`.
    Update(Account),
    /// Remove an existing record, under the same revision check as `Update`.
    Delete { username: Username, revision: u64 },
}

impl Mutation {
    pub fn username(&self) -> &Username {
        match self {
            Self::Create(a) | Self::Update(a) => &a.username,
            Self::Delete { username, .. } => username,
        }
    }
}

/// A checked mutation, ready for a backend to apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Planned {
    /// Store this record; its revision is already the new one.
    Write(Account),
    Remove(Username),
}

impl Planned {
    pub fn username(&self) -> &Username {
        match self {
            Self::Write(a) => &a.username,
            Self::Remove(u) => u,
        }
    }
}

/// The records a plan writes, in unit-of-work order.
pub fn written(planned: Vec<Planned>) -> Vec<Account> {
    planned
        .into_iter()
        .filter_map(|p| match p {
            Planned::Write(a) => Some(a),
            Planned::Remove(_) => None,
        })
        .collect()
}

/// A set of record mutations that a store commits atomically.
///
/// Either every mutation applies, each written record receiving the next
/// revision, or none does. A unit of work may touch a username at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    mutations: Vec<Mutation>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(mut self, account: Account) -> Self {
        self.mutations.push(Mutation::Create(account));
        self
    }

    pub fn update(mut self, account: Account) -> Self {
        self.mutations.push(Mutation::Update(account));
        self
    }

    pub fn delete(mut self, username: Username, revision: u64) -> Self {
        self.mutations.push(Mutation::Delete { username, revision });
        self
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Reject units of work that name the same username twice.
    pub fn validate(&self) -> StoreResult<()> {
        let mut seen = HashSet::with_capacity(self.mutations.len());
        for m in &self.mutations {
            if !seen.insert(m.username()) {
                return Err(StoreError::InvalidUnitOfWork(format!(
                    "username {} appears more than once",
                    m.username()
                )));
            }
        }
        Ok(())
    }

    /// Check every mutation against the current revisions and return what
    /// to apply, with new revisions assigned to written records.
    ///
    /// `current` reports the stored revision of a username, or `None` when
    /// absent. Nothing is written here; backends call this inside their own
    /// exclusive section and only write if every check passed.
    pub fn plan<F>(&self, mut current: F) -> StoreResult<Vec<Planned>>
    where
        F: FnMut(&Username) -> StoreResult<Option<u64>>,
    {
        self.validate()?;
        let mut planned = Vec::with_capacity(self.mutations.len());
        for m in &self.mutations {
            match m {
                Mutation::Create(account) => {
                    if current(&account.username)?.is_some() {
                        return Err(StoreError::AlreadyExists(account.username.clone()));
                    }
                    let mut next = account.clone();
                    next.revision = 1;
                    planned.push(Planned::Write(next));
                }
                Mutation::Update(account) => {
                    let found = check_revision(&mut current, &account.username, account.revision)?;
                    let mut next = account.clone();
                    next.revision = found + 1;
                    planned.push(Planned::Write(next));
                }
                Mutation::Delete { username, revision } => {
                    check_revision(&mut current, username, *revision)?;
                    planned.push(Planned::Remove(username.clone()));
                }
            }
        }
        Ok(planned)
    }
}

fn check_revision<F>(current: &mut F, username: &Username, expected: u64) -> StoreResult<u64>
where
    F: FnMut(&Username) -> StoreResult<Option<u64>>,
{
    let found = current(username)?.ok_or_else(|| StoreError::NotFound(username.clone()))?;
    if found != expected {
        return Err(StoreError::Conflict {
            username: username.clone(),
            expected,
            found,
        });
    }
    Ok(found)
}

/// Persistence contract for ledger accounts.
///
/// All implementations must satisfy these invariants:
/// - Records are keyed by [`Username`]; at most one record per username.
/// - Every write stores the record with its revision incremented, so a
///   reader can detect that a record changed since it was read.
/// - [`AccountStore::commit`] is atomic and serializable: concurrent units
///   of work touching a common username never both succeed against the
///   same revision.
/// - A failed call leaves the store unchanged.
pub trait AccountStore: Send + Sync {
    /// Read an account. Returns `Ok(None)` if the username is absent.
    fn get(&self, username: &Username) -> StoreResult<Option<Account>>;

    /// Unconditional upsert. The stored revision becomes one past whatever
    /// was stored before (or `1` for a new record).
    fn put(&self, account: &Account) -> StoreResult<()>;

    /// Remove an account. Returns `true` if it existed; deleting an absent
    /// username is not an error.
    fn delete(&self, username: &Username) -> StoreResult<bool>;

    /// All accounts, sorted by username.
    fn list(&self) -> StoreResult<Vec<Account>>;

    /// Atomically apply a unit of work and return the written records, in
    /// order. Deleted records are not returned.
    fn commit(&self, work: &UnitOfWork) -> StoreResult<Vec<Account>>;

    /// Remove every account. Returns how many were removed.
    fn clear(&self) -> StoreResult<usize>;

    /// Check whether an account exists.
    fn exists(&self, username: &Username) -> StoreResult<bool> {
        Ok(self.get(username)?.is_some())
    }

    /// Make all prior writes durable. No-op for volatile stores.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
