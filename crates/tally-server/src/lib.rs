//! HTTP server for the Tally ledger.
//!
//! A thin JSON adapter: every route maps onto one [`LedgerService`] or
//! [`AdminOperations`](tally_ledger::AdminOperations) call and every
//! [`LedgerError`](tally_ledger::LedgerError) onto a status code. Requests
//! needing an identity carry `{ "auth": { "username", "credential" } }`,
//! checked on each call by an [`AuthProvider`].
//!
//! [`LedgerService`]: tally_ledger::LedgerService

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

#[cfg(test)]
mod testing;

pub use auth::{AuthProvider, Credentials, Identity, LedgerAuth};
pub use config::ServerConfig;
pub use error::{ErrorBody, ServerError, ServerResult};
pub use handler::AppState;
pub use router::build_router;
pub use server::TallyServer;
