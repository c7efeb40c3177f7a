//! API errors and their JSON shape.
//!
//! Every error response carries a fresh `errorId` that is also logged, so a
//! support request can be matched to the server log line.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::ledger::{LedgerError, Rejection};

/// Errors returned by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body or out-of-range value (400)
    #[error("{0}")]
    Validation(String),

    /// Missing or bad session token or webhook signature (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Acting on another user's id (403)
    #[error("cannot act on behalf of another user")]
    Forbidden,

    /// Unknown entity (404)
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// Benign refusal of a user action (409)
    #[error("{0}")]
    Rejected(Rejection),

    /// Storage or runtime failure (500)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Rejected(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Rejected(rejection) => rejection.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(message) => Self::Validation(message),
            LedgerError::NotFound { entity, id } => Self::NotFound { entity, id },
            LedgerError::Rejected(rejection) => Self::Rejected(rejection),
            LedgerError::Balance(e) => Self::Validation(e.to_string()),
            LedgerError::Store(e) => Self::Internal(e.to_string()),
            LedgerError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey => Self::Internal("server secret is unusable".into()),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Machine-readable code
    pub error: &'static str,
    /// Human-readable message
    pub message: String,
    /// Correlation id, also logged
    pub error_id: Uuid,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = Uuid::new_v4();

        if status.is_server_error() {
            tracing::error!(%error_id, error = %self, "API error");
        } else {
            tracing::warn!(%error_id, code = self.error_code(), error = %self, "API error");
        }

        let body = ErrorResponse {
            success: false,
            error: self.error_code(),
            message: self.to_string(),
            error_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::validation("bad"), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
            (
                ApiError::Rejected(Rejection::TaskAlreadyCompleted),
                StatusCode::CONFLICT,
            ),
            (ApiError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_ledger_error_mapping() {
        let err: ApiError = LedgerError::NotFound {
            entity: "booster",
            id: "x9".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = LedgerError::Store(StateError::Codec("bad bytes".into())).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = LedgerError::Internal("no free referral code".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = LedgerError::Rejected(Rejection::DailyTaskAlreadyCompleted).into();
        assert_eq!(err.error_code(), "DAILY_TASK_ALREADY_COMPLETED");
        assert_eq!(
            err.to_string(),
            "Daily task already completed today. Come back tomorrow!"
        );
    }

    #[test]
    fn test_crypto_errors_are_unauthorized() {
        let err: ApiError = CryptoError::InvalidSignature.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
