use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum accepted credential length in bytes.
pub const MAX_CREDENTIAL_LEN: usize = 1024;

/// A raw secret presented by a caller.
///
/// `Credential` is deliberately not `Serialize` and its `Debug` output is
/// redacted, so the secret cannot end up in a log line or a stored record
/// by accident. Only the hasher reads it, through [`Credential::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Result<Self, TypeError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TypeError::EmptyCredential);
        }
        if secret.len() > MAX_CREDENTIAL_LEN {
            return Err(TypeError::CredentialTooLong {
                max: MAX_CREDENTIAL_LEN,
                actual: secret.len(),
            });
        }
        Ok(Self(secret))
    }

    /// Borrow the raw secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Salted one-way hash of a credential, in PHC string format.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Wrap an already-computed PHC string.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The algorithm prefix is useful when debugging; the salt and
        // digest are not.
        let algorithm = self.0.split('$').nth(1).unwrap_or("?");
        write!(f, "CredentialHash({algorithm}, ..)")
    }
}
