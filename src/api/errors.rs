//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::{GameError, LedgerError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, ROUND_CLOSED, INSUFFICIENT_BALANCE, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
    /// Overrides the generic code of `kind`
    pub code: Option<&'static str>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn new(kind: ApiErrorKind, request_id: String) -> Self {
        Self {
            kind,
            request_id,
            code: None,
            details: None,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::NotFound(message), request_id)
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::BadRequest(message), request_id)
    }

    pub fn conflict(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::Conflict(message), request_id)
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::InternalError(message), request_id)
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::ServiceUnavailable(message), request_id)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Map an engine rejection onto a status code and a stable error code
    pub fn from_game(request_id: String, err: GameError) -> Self {
        let message = err.to_string();
        let (error, code) = match &err {
            GameError::InsufficientBalance { .. } => (Self::bad_request(request_id, message), "INSUFFICIENT_BALANCE"),
            GameError::InvalidAmount => (Self::bad_request(request_id, message), "INVALID_AMOUNT"),
            GameError::InvalidAutoCashout(_) => (Self::bad_request(request_id, message), "INVALID_AUTO_CASHOUT"),
            GameError::InvalidCell { .. } => (Self::bad_request(request_id, message), "INVALID_CELL"),
            GameError::InvalidMineCount { .. } => (Self::bad_request(request_id, message), "INVALID_MINE_COUNT"),
            GameError::WagerNotFound(_) => (Self::not_found(request_id, message), "WAGER_NOT_FOUND"),
            GameError::SessionNotFound(_) => (Self::not_found(request_id, message), "SESSION_NOT_FOUND"),
            GameError::RoundClosed { .. } => (Self::conflict(request_id, message), "ROUND_CLOSED"),
            GameError::RoundNotLive { .. } => (Self::conflict(request_id, message), "ROUND_NOT_LIVE"),
            GameError::AlreadyResolved => (Self::conflict(request_id, message), "ALREADY_RESOLVED"),
            GameError::InvalidMultiplier { .. } => (Self::conflict(request_id, message), "INVALID_MULTIPLIER"),
            GameError::SessionTerminal => (Self::conflict(request_id, message), "SESSION_TERMINAL"),
            GameError::ActiveSessionExists(_) => (Self::conflict(request_id, message), "ACTIVE_SESSION_EXISTS"),
            GameError::OutcomeUnavailable(_) => (Self::service_unavailable(request_id, message), "OUTCOME_UNAVAILABLE"),
            GameError::Ledger(LedgerError::Unavailable(_)) => {
                (Self::service_unavailable(request_id, message), "LEDGER_UNAVAILABLE")
            }
            GameError::Ledger(_) => (Self::internal_error(request_id, message), "LEDGER_ERROR"),
        };

        let error = error.with_code(code);
        match err {
            GameError::InvalidMultiplier { authoritative, .. } => {
                error.with_details(serde_json::json!({ "authoritative_multiplier": authoritative }))
            }
            GameError::ActiveSessionExists(session_id) => {
                error.with_details(serde_json::json!({ "session_id": session_id }))
            }
            _ => error,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Conflict(msg) => write!(f, "[{}] Conflict: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::ServiceUnavailable(msg) => write!(f, "[{}] Service Unavailable: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiErrorKind::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiErrorKind::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: self.code.unwrap_or(code).to_string(),
                message,
                details: self.details,
            },
        });

        (status, body).into_response()
    }
}
