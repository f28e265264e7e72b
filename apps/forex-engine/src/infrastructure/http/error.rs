//! REST error responses.
//!
//! Every failure is rendered as `{"kind": "...", "message": "..."}` with a
//! status code chosen by kind.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::order::{ErrorKind, OrderError};

/// An error returned by a REST handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ApiError {
    /// Validation failure with `message`.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationError,
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

/// HTTP status for an error kind.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::AccountConstraintError => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition | ErrorKind::OrderNotCancelable => StatusCode::CONFLICT,
        ErrorKind::ConflictError => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = %self.kind, message = %self.message, "Request failed");
        } else {
            tracing::debug!(kind = %self.kind, message = %self.message, "Request refused");
        }
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::order::OrderStatus;

    #[test_case(ErrorKind::ValidationError, StatusCode::UNPROCESSABLE_ENTITY)]
    #[test_case(ErrorKind::AccountConstraintError, StatusCode::UNPROCESSABLE_ENTITY)]
    #[test_case(ErrorKind::NotFound, StatusCode::NOT_FOUND)]
    #[test_case(ErrorKind::InvalidTransition, StatusCode::CONFLICT)]
    #[test_case(ErrorKind::OrderNotCancelable, StatusCode::CONFLICT)]
    #[test_case(ErrorKind::ConflictError, StatusCode::SERVICE_UNAVAILABLE)]
    fn kind_to_status(kind: ErrorKind, expected: StatusCode) {
        assert_eq!(status_for(kind), expected);
    }

    #[test]
    fn order_errors_keep_their_kind() {
        let err = ApiError::from(OrderError::NotCancelable {
            order_id: "o-1".to_string(),
            status: OrderStatus::Filled,
        });
        assert_eq!(err.kind, ErrorKind::OrderNotCancelable);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.message.contains("o-1"));
    }

    #[test]
    fn body_shape() {
        let value = serde_json::to_value(ApiError::validation("bad side")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"kind": "VALIDATION_ERROR", "message": "bad side"})
        );
    }
}
