use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(e) => match e {
                LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                LedgerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                LedgerError::PermissionDenied => StatusCode::FORBIDDEN,
                LedgerError::UserNotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::DuplicateUsername(_)
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::Overflow(_) => StatusCode::CONFLICT,
                LedgerError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Bootstrap(_) | LedgerError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.code(),
            Self::Io(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
