use std::future::Future;

use tally_ledger::LedgerService;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// HTTP front end for a [`LedgerService`].
pub struct TallyServer {
    config: ServerConfig,
    ledger: LedgerService,
}

impl TallyServer {
    pub fn new(config: ServerConfig, ledger: LedgerService) -> Self {
        Self { config, ledger }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.ledger.clone(), &self.config)
    }

    /// Serve until the process is killed.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then flush the store.
    pub async fn serve_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            backend = self.ledger.store().backend_name(),
            "tally server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        self.ledger
            .store()
            .flush()
            .map_err(|e| ServerError::Internal(format!("flush on shutdown failed: {e}")))?;
        tracing::info!("tally server stopped");
        Ok(())
    }
}
