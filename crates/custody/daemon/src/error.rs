//! Error types for custodyd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use custody_oracle::OracleError;
use custody_types::ReasonCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Oracle initialization failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                ReasonCode::InvalidPayload.as_str().to_string(),
            ),
            ApiError::Oracle(err) => match err.code() {
                Some(ReasonCode::PolicyDenied) => (
                    StatusCode::FORBIDDEN,
                    ReasonCode::PolicyDenied.as_str().to_string(),
                ),
                Some(code) => (StatusCode::BAD_REQUEST, code.as_str().to_string()),
                None => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR".to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
