use std::sync::OnceLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tally_types::{Credential, CredentialHash};

use crate::error::CryptoError;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    /// Minimal cost for tests. Never use for real credentials.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies credentials with Argon2id.
///
/// Every hash gets a fresh random salt, so hashing the same credential twice
/// yields different PHC strings. Verification reads the algorithm, version
/// and cost from the stored hash, so hashes made under an older
/// [`HashCost`] keep verifying after the configured cost changes.
pub struct CredentialHasher {
    params: Params,
    cost: HashCost,
    dummy: OnceLock<CredentialHash>,
}

impl CredentialHasher {
    pub fn new(cost: HashCost) -> Result<Self, CryptoError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| CryptoError::InvalidParams(e.to_string()))?;
        Ok(Self {
            params,
            cost,
            dummy: OnceLock::new(),
        })
    }

    pub fn cost(&self) -> HashCost {
        self.cost
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produce a salted one-way hash of `credential`.
    pub fn hash(&self, credential: &Credential) -> Result<CredentialHash, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = self
            .argon2()
            .hash_password(credential.expose().as_bytes(), &salt)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?
            .to_string();
        Ok(CredentialHash::from_phc(phc))
    }

    /// Check `credential` against a stored hash in constant time.
    ///
    /// Returns `Ok(false)` on mismatch and `Err` only when the stored hash
    /// itself is unusable.
    pub fn verify(&self, credential: &Credential, hash: &CredentialHash) -> Result<bool, CryptoError> {
        let parsed = PasswordHash::new(hash.as_str()).map_err(|_| CryptoError::MalformedHash)?;
        match self
            .argon2()
            .verify_password(credential.expose().as_bytes(), &parsed)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CryptoError::Hashing(e.to_string())),
        }
    }

    /// Spend the same work as a real verification without a stored hash.
    ///
    /// Callers use this when the named account does not exist so that a
    /// failed login costs the same whether or not the username is taken.
    pub fn verify_dummy(&self, credential: &Credential) {
        let dummy = self.dummy.get_or_init(|| {
            let filler = Credential::new("tally-timing-equalizer").unwrap_or_else(|_| credential.clone());
            match self.hash(&filler) {
                Ok(hash) => hash,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to prepare timing-equalizer hash");
                    CredentialHash::from_phc("")
                }
            }
        });
        let _ = self.verify(credential, dummy);
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
            cost: HashCost::default(),
            dummy: OnceLock::new(),
        }
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("cost", &self.cost)
            .finish()
    }
}
