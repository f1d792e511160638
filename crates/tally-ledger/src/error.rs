use tally_crypto::CryptoError;
use tally_store::StoreError;
use tally_types::{TypeError, Username};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Malformed arguments, rejected before the store is touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("username already taken: {0}")]
    DuplicateUsername(Username),

    /// Unknown username or wrong credential; deliberately indistinguishable.
    #[error("invalid username or credential")]
    InvalidCredentials,

    #[error("user not found: {0}")]
    UserNotFound(Username),

    #[error("insufficient funds: {username} holds {available}, transfer needs {requested}")]
    InsufficientFunds {
        username: Username,
        available: i64,
        requested: i64,
    },

    #[error("permission denied")]
    PermissionDenied,

    /// A credit would overflow the recipient's holdings.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// Transient backend failure. Nothing was mutated; the call may be retried.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The admin account could not be seeded.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable machine-readable name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DuplicateUsername(_) => "duplicate_username",
            Self::InvalidCredentials => "invalid_credentials",
            Self::UserNotFound(_) => "user_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::PermissionDenied => "permission_denied",
            Self::Overflow(_) => "overflow",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Bootstrap(_) => "bootstrap",
            Self::Internal(_) => "internal",
        }
    }

    /// `true` when retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<TypeError> for LedgerError {
    fn from(e: TypeError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(u) => Self::DuplicateUsername(u),
            StoreError::NotFound(u) => Self::UserNotFound(u),
            StoreError::InvalidUnitOfWork(msg) => Self::Internal(msg),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<CryptoError> for LedgerError {
    fn from(e: CryptoError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
