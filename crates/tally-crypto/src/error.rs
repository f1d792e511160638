/// Errors from credential hashing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The configured Argon2 cost parameters are out of range.
    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),

    /// Hashing failed inside the Argon2 implementation.
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// A stored hash could not be parsed as a PHC string.
    #[error("malformed credential hash")]
    MalformedHash,
}
