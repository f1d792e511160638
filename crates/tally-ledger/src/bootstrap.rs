use serde::Serialize;
use tally_crypto::generate_secret;
use tally_store::{StoreError, UnitOfWork};
use tally_types::{Account, Username};
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::service::LedgerService;
use crate::validation::parse_credential;

/// Bytes of randomness in a generated admin credential.
const GENERATED_CREDENTIAL_BYTES: usize = 16;

/// What [`Bootstrap::ensure_admin_seeded`] found or did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// An admin account already exists; nothing was written.
    AlreadySeeded { username: Username },
    /// The admin account was created. `generated_credential` is set when no
    /// credential was configured; it is returned only this once.
    Seeded {
        username: Username,
        generated_credential: Option<String>,
    },
}

/// Seeds the privileged account on an empty (or admin-less) store.
#[derive(Clone, Debug)]
pub struct Bootstrap {
    ledger: LedgerService,
}

impl Bootstrap {
    pub(crate) fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    /// Ensure exactly one admin account exists.
    ///
    /// Idempotent, and safe to run from several processes at once: the seed
    /// is a create-if-absent, so a racing second caller observes the first
    /// caller's admin and reports [`BootstrapOutcome::AlreadySeeded`].
    pub fn ensure_admin_seeded(&self) -> LedgerResult<BootstrapOutcome> {
        let store = self.ledger.store();
        if let Some(admin) = store.list()?.into_iter().find(|a| a.is_admin) {
            return Ok(BootstrapOutcome::AlreadySeeded {
                username: admin.username,
            });
        }

        let config = self.ledger.config();
        let username = Username::parse(config.admin_username.as_str())
            .map_err(|e| LedgerError::Bootstrap(format!("admin username: {e}")))?;
        let (credential, generated) = match &config.admin_credential {
            Some(configured) => (parse_credential(configured)?, None),
            None => {
                let secret = generate_secret(GENERATED_CREDENTIAL_BYTES);
                (parse_credential(&secret)?, Some(secret))
            }
        };
        let hash = self.ledger.hasher().hash(&credential)?;
        let admin = Account::new_admin(username.clone(), hash, config.admin_tokens);

        match store.commit(&UnitOfWork::new().create(admin)) {
            Ok(_) => {
                info!(username = %username, tokens = config.admin_tokens, "admin account seeded");
                if generated.is_some() {
                    warn!(username = %username, "admin credential was generated; rotate it after first login");
                }
                Ok(BootstrapOutcome::Seeded {
                    username,
                    generated_credential: generated,
                })
            }
            Err(StoreError::AlreadyExists(taken)) => match store.get(&taken)? {
                Some(existing) if existing.is_admin => {
                    Ok(BootstrapOutcome::AlreadySeeded { username: taken })
                }
                _ => Err(LedgerError::Bootstrap(format!(
                    "username {taken} is held by a non-admin account"
                ))),
            },
            Err(e) => Err(e.into()),
        }
    }
}
