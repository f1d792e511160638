//! Request handlers. Ledger calls block on hashing and storage I/O, so each
//! one runs on tokio's blocking pool.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_ledger::{LedgerResult, LedgerService, WipeOutcome};
use tally_types::{AccountSummary, TransferReceipt};

use crate::auth::{AuthProvider, Credentials, Identity};
use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    async fn identify(&self, credentials: &Credentials) -> ServerResult<Identity> {
        self.auth.authenticate(credentials).await
    }
}

/// Run a ledger call off the async executor.
pub(crate) async fn blocking<T, F>(call: F) -> ServerResult<T>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ServerError::Internal(format!("ledger task failed: {e}")))?
        .map_err(ServerError::from)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub credential: String,
}

#[derive(Deserialize)]
pub struct ChangeCredentialRequest {
    pub current: String,
    pub new: String,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub auth: Credentials,
    pub to: String,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct AdminRequest {
    pub auth: Credentials,
}

#[derive(Deserialize)]
pub struct TargetRequest {
    pub auth: Credentials,
    pub target: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub auth: Credentials,
    pub target: String,
    pub new_credential: String,
}

#[derive(Deserialize)]
pub struct WipeRequest {
    pub auth: Credentials,
    pub confirmation: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.ledger.store().backend_name(),
    })
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ServerResult<(StatusCode, Json<AccountSummary>)> {
    let ledger = state.ledger.clone();
    let created = blocking(move || ledger.create_account(&req.username, &req.credential)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> ServerResult<Json<AccountSummary>> {
    let ledger = state.ledger.clone();
    let account = blocking(move || ledger.authenticate(&req.username, &req.credential)).await?;
    Ok(Json(account.summary()))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ServerResult<Json<AccountSummary>> {
    let ledger = state.ledger.clone();
    Ok(Json(blocking(move || ledger.get_account(&username)).await?))
}

pub async fn change_credential(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<ChangeCredentialRequest>,
) -> ServerResult<StatusCode> {
    let ledger = state.ledger.clone();
    blocking(move || ledger.change_credential(&username, &req.current, &req.new)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> ServerResult<Json<TransferReceipt>> {
    let caller = state.identify(&req.auth).await?;
    let ledger = state.ledger.clone();
    let receipt =
        blocking(move || ledger.transfer(caller.username.as_str(), &req.to, req.amount)).await?;
    Ok(Json(receipt))
}

pub async fn admin_list(
    State(state): State<AppState>,
    Json(req): Json<AdminRequest>,
) -> ServerResult<Json<Vec<AccountSummary>>> {
    let caller = state.identify(&req.auth).await?;
    let admin = state.ledger.admin();
    Ok(Json(
        blocking(move || admin.list_accounts(caller.username.as_str())).await?,
    ))
}

pub async fn admin_reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ServerResult<StatusCode> {
    let caller = state.identify(&req.auth).await?;
    let admin = state.ledger.admin();
    blocking(move || {
        admin.reset_password(caller.username.as_str(), &req.target, &req.new_credential)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_reset_tokens(
    State(state): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> ServerResult<Json<AccountSummary>> {
    let caller = state.identify(&req.auth).await?;
    let admin = state.ledger.admin();
    Ok(Json(
        blocking(move || admin.reset_tokens(caller.username.as_str(), &req.target)).await?,
    ))
}

pub async fn admin_delete(
    State(state): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> ServerResult<Json<Value>> {
    let caller = state.identify(&req.auth).await?;
    let admin = state.ledger.admin();
    let removed =
        blocking(move || admin.delete_account(caller.username.as_str(), &req.target)).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn admin_wipe(
    State(state): State<AppState>,
    Json(req): Json<WipeRequest>,
) -> ServerResult<Json<WipeOutcome>> {
    let caller = state.identify(&req.auth).await?;
    let admin = state.ledger.admin();
    Ok(Json(
        blocking(move || admin.wipe_all(caller.username.as_str(), &req.confirmation)).await?,
    ))
}
