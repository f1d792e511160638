use thiserror::Error;

/// Errors produced when constructing validated ledger types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("username must not be empty")]
    EmptyUsername,

    #[error("username too long: at most {max} bytes, got {actual}")]
    UsernameTooLong { max: usize, actual: usize },

    #[error("invalid username: {reason}")]
    InvalidUsername { reason: String },

    #[error("credential must not be empty")]
    EmptyCredential,

    #[error("credential too long: at most {max} bytes, got {actual}")]
    CredentialTooLong { max: usize, actual: usize },
}
