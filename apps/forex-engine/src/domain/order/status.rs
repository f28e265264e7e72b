//! Order status in the lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Order status.
///
/// ```text
/// PENDING ──┬──► PARTIALLY_FILLED ──┬──► FILLED
///           │          │  ▲         └──► CANCELED
///           │          └──┘
///           ├──► FILLED
///           ├──► REJECTED
///           └──► CANCELED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the gateway, waiting for the engine.
    Pending,
    /// Some, but not all, of the quantity has been filled.
    PartiallyFilled,
    /// Entire quantity filled.
    Filled,
    /// Rejected by the engine (liquidity or account constraints).
    Rejected,
    /// Canceled by the client.
    Canceled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::PartiallyFilled,
        Self::Filled,
        Self::Rejected,
        Self::Canceled,
    ];

    /// Returns true if no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Rejected | Self::Canceled)
    }

    /// Returns true if the order can still be filled or canceled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFilled)
    }

    /// Returns true if a cancel request is honored in this status.
    #[must_use]
    pub const fn is_cancelable(&self) -> bool {
        self.is_active()
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse a status from its wire name (case-insensitive).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        Self::ALL.into_iter().find(|status| status.as_str() == upper)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
    }

    #[test]
    fn active_is_complement_of_terminal() {
        for status in OrderStatus::ALL {
            assert_eq!(status.is_active(), !status.is_terminal());
            assert_eq!(status.is_cancelable(), status.is_active());
        }
    }

    #[test]
    fn serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap(),
            "\"PARTIALLY_FILLED\""
        );
        let parsed: OrderStatus = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(parsed, OrderStatus::Canceled);
    }

    #[test]
    fn display_matches_wire_name() {
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn parse_case_insensitive() {
        assert_eq!(
            OrderStatus::from_str_case_insensitive("partially_filled"),
            Some(OrderStatus::PartiallyFilled)
        );
        assert_eq!(
            OrderStatus::from_str_case_insensitive(" filled "),
            Some(OrderStatus::Filled)
        );
        assert_eq!(OrderStatus::from_str_case_insensitive("EXECUTED"), None);
    }
}
