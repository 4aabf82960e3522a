use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::core::storage::StoreError;

/// Failure taxonomy surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Ticket {0} has already been resolved")]
    AlreadyResolved(i64),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CrmResult<T> = std::result::Result<T, CrmError>;

impl CrmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyResolved(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to hand back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for CrmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::AlreadyResolved(ticket_id) => Self::AlreadyResolved(ticket_id),
            StoreError::Database(msg) | StoreError::Pool(msg) => Self::Internal(msg),
        }
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("Request failed: {detail}");
        }
        let status = self.status_code();
        let body = Json(json!({
            "error": self.error_code(),
            "message": self.public_message()
        }));
        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
        }
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CrmError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(CrmError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(CrmError::AlreadyResolved(1).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CrmError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CrmError::internal("pool exhausted").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_public() {
        let err = CrmError::internal("password=hunter2 in connection string");
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: CrmError = StoreError::NotFound("Ticket not found with id: 9".into()).into();
        assert!(matches!(err, CrmError::NotFound(ref m) if m.contains("9")));

        let err: CrmError = StoreError::Conflict("Email already registered".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: CrmError = StoreError::Database("boom".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
