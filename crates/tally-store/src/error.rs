use tally_types::Username;

/// Errors from account store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A create targeted a username that is already taken.
    #[error("account already exists: {0}")]
    AlreadyExists(Username),

    /// An update targeted a record that does not exist.
    #[error("account not found: {0}")]
    NotFound(Username),

    /// An optimistic update lost a race: the stored revision moved on.
    #[error("revision conflict on {username}: expected {expected}, found {found}")]
    Conflict {
        username: Username,
        expected: u64,
        found: u64,
    },

    /// A unit of work touched the same username twice.
    #[error("invalid unit of work: {0}")]
    InvalidUnitOfWork(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data failed an integrity check.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// The storage engine reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The store cannot serve requests right now (poisoned lock, timeout).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// `true` for outcomes that a caller resolves by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
