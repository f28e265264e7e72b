//! Order lifecycle errors.

use serde::Serialize;
use thiserror::Error;

use super::status::OrderStatus;

/// Every failure the order core can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Malformed or out-of-range submission field.
    #[error("invalid order parameter '{field}': {message}")]
    Validation {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// Account cannot carry the order (margin).
    #[error("account {account_id} constraint violated: {message}")]
    AccountConstraint {
        /// Account ID.
        account_id: String,
        /// Error message.
        message: String,
    },

    /// Order or account does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record ("order" or "account").
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Attempted transition is not an edge of the lifecycle.
    #[error("invalid order state transition: {from} -> {to}: {reason}")]
    InvalidTransition {
        /// Current order status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Reason for failure.
        reason: String,
    },

    /// Cancel requested for an order that already reached a terminal state.
    #[error("order {order_id} cannot be canceled in status {status}")]
    NotCancelable {
        /// Order ID.
        order_id: String,
        /// Current status.
        status: OrderStatus,
    },

    /// Optimistic concurrency check failed.
    #[error("version conflict on order {order_id}: expected {expected}, actual {actual}")]
    Conflict {
        /// Order ID.
        order_id: String,
        /// Version the writer read.
        expected: u64,
        /// Version in the store.
        actual: u64,
    },

    /// An order with this ID already exists.
    #[error("duplicate order ID: {order_id}")]
    DuplicateOrderId {
        /// Order ID.
        order_id: String,
    },
}

impl OrderError {
    /// Shorthand for a validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a missing order.
    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "order",
            id: order_id.into(),
        }
    }

    /// Client-visible category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::AccountConstraint { .. } => ErrorKind::AccountConstraintError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::NotCancelable { .. } => ErrorKind::OrderNotCancelable,
            Self::Conflict { .. } | Self::DuplicateOrderId { .. } => ErrorKind::ConflictError,
        }
    }
}

/// Error categories exposed to REST and WebSocket clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Request data is invalid.
    ValidationError,
    /// Account margin rules refused the order.
    AccountConstraintError,
    /// Transition not permitted from the current status.
    InvalidTransition,
    /// Order is already terminal.
    OrderNotCancelable,
    /// Concurrent modification; safe to retry.
    ConflictError,
    /// Unknown order or account.
    NotFound,
}

impl ErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::AccountConstraintError => "ACCOUNT_CONSTRAINT_ERROR",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::OrderNotCancelable => "ORDER_NOT_CANCELABLE",
            Self::ConflictError => "CONFLICT_ERROR",
            Self::NotFound => "NOT_FOUND",
        }
    }

    /// Whether the client may retry the same request unchanged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConflictError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Filled,
            to: OrderStatus::Canceled,
            reason: "order is already filled".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("FILLED"));
        assert!(msg.contains("CANCELED"));
    }

    #[test]
    fn not_found_display() {
        let err = OrderError::order_not_found("ord-123");
        assert_eq!(err.to_string(), "order not found: ord-123");
    }

    #[test]
    fn conflict_display_includes_versions() {
        let err = OrderError::Conflict {
            order_id: "ord-1".to_string(),
            expected: 2,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("actual 3"));
    }

    #[test]
    fn kinds_map_to_wire_names() {
        let cases = [
            (OrderError::validation("quantity", "must be positive"), "VALIDATION_ERROR"),
            (
                OrderError::AccountConstraint {
                    account_id: "acc".to_string(),
                    message: "insufficient margin".to_string(),
                },
                "ACCOUNT_CONSTRAINT_ERROR",
            ),
            (OrderError::order_not_found("x"), "NOT_FOUND"),
            (
                OrderError::NotCancelable {
                    order_id: "x".to_string(),
                    status: OrderStatus::Filled,
                },
                "ORDER_NOT_CANCELABLE",
            ),
            (
                OrderError::DuplicateOrderId {
                    order_id: "x".to_string(),
                },
                "CONFLICT_ERROR",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.kind().as_str(), expected);
        }
    }

    #[test]
    fn only_conflicts_are_transient() {
        assert!(ErrorKind::ConflictError.is_transient());
        assert!(!ErrorKind::NotFound.is_transient());
        assert!(!ErrorKind::ValidationError.is_transient());
    }

    #[test]
    fn kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&ErrorKind::OrderNotCancelable).unwrap();
        assert_eq!(json, "\"ORDER_NOT_CANCELABLE\"");
    }
}
