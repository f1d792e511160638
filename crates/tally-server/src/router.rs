use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tally_ledger::LedgerService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::LedgerAuth;
use crate::config::ServerConfig;
use crate::handler::{self, AppState};

/// Build the axum router with all ledger endpoints.
pub fn build_router(ledger: LedgerService, config: &ServerConfig) -> Router {
    let state = AppState {
        auth: Arc::new(LedgerAuth::new(ledger.clone())),
        ledger,
    };
    let router = Router::new()
        .route("/v1/health", get(handler::health))
        .route("/v1/accounts", post(handler::signup))
        .route("/v1/login", post(handler::login))
        .route("/v1/accounts/:username", get(handler::get_account))
        .route("/v1/accounts/:username/credential", post(handler::change_credential))
        .route("/v1/transfers", post(handler::transfer))
        .route("/v1/admin/accounts", post(handler::admin_list))
        .route("/v1/admin/reset-password", post(handler::admin_reset_password))
        .route("/v1/admin/reset-tokens", post(handler::admin_reset_tokens))
        .route("/v1/admin/delete", post(handler::admin_delete))
        .route("/v1/admin/wipe", post(handler::admin_wipe))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if config.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
