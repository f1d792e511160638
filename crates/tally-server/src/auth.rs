use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use tally_ledger::LedgerService;
use tally_types::Username;

use crate::error::ServerResult;
use crate::handler::blocking;

/// A caller whose credential has been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub username: Username,
    pub is_admin: bool,
}

/// Username and credential presented with a request.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub credential: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Turns presented credentials into an [`Identity`].
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Checks credentials against the ledger's stored hashes.
pub struct LedgerAuth {
    ledger: LedgerService,
}

impl LedgerAuth {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl AuthProvider for LedgerAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        let ledger = self.ledger.clone();
        let credentials = credentials.clone();
        let account =
            blocking(move || ledger.authenticate(&credentials.username, &credentials.credential))
                .await?;
        Ok(Identity {
            username: account.username,
            is_admin: account.is_admin,
        })
    }
}
