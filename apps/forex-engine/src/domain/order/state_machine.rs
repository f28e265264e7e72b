//! Order State Machine
//!
//! Validates lifecycle transitions and applies commands to produce the next
//! order version. Pure and deterministic: the caller supplies the clock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Order, OrderError, OrderEvent, OrderStatus};

/// A request to move an order along its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCommand {
    /// Fill `quantity` more units.
    Fill {
        /// Quantity filled by this step.
        quantity: Decimal,
    },
    /// Client cancel.
    Cancel,
    /// Engine reject.
    Reject {
        /// Human-readable reason, carried on the event.
        reason: String,
    },
}

/// Result of applying a command: the next order version and its event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status before the command.
    pub from: OrderStatus,
    /// Order after the command.
    pub order: Order,
    /// Event to publish once the order is committed.
    pub event: OrderEvent,
}

/// Order State Machine for validating and applying transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From Pending
            (OrderStatus::Pending, OrderStatus::PartiallyFilled)
                | (OrderStatus::Pending, OrderStatus::Filled)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Pending, OrderStatus::Canceled)
                // From PartiallyFilled
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Canceled)
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `from -> to` is not an edge.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                from,
                to,
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Get a human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Filled => format!("order is already filled, cannot transition to {to}"),
            OrderStatus::Canceled => format!("order is canceled, cannot transition to {to}"),
            OrderStatus::Rejected => format!("order was rejected, cannot transition to {to}"),
            _ => format!("invalid transition from {from} to {to}"),
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Rejected,
                OrderStatus::Canceled,
            ],
            OrderStatus::PartiallyFilled => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Canceled,
            ],
            // Terminal states
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected => vec![],
        }
    }

    /// Apply `command` to `order`, producing the next version.
    ///
    /// The input order is untouched; the caller commits the returned order.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` for fills or rejects from a terminal state, a
    ///   reject from `PARTIALLY_FILLED`, or a fill quantity that is not
    ///   positive or exceeds the remaining quantity.
    /// - `NotCancelable` for a cancel from a terminal state.
    pub fn apply(
        order: &Order,
        command: &OrderCommand,
        at: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        let from = order.status;
        let mut next = order.clone();
        let delta = match command {
            OrderCommand::Fill { quantity } => {
                let quantity = *quantity;
                let remaining = order.remaining_quantity();
                let to = if quantity == remaining {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                if from.is_terminal() {
                    Self::validate_transition(from, to)?;
                }
                if quantity <= Decimal::ZERO {
                    return Err(OrderError::InvalidTransition {
                        from,
                        to,
                        reason: format!("fill quantity {quantity} must be positive"),
                    });
                }
                if quantity > remaining {
                    return Err(OrderError::InvalidTransition {
                        from,
                        to: OrderStatus::Filled,
                        reason: format!("fill quantity {quantity} exceeds remaining {remaining}"),
                    });
                }
                Self::validate_transition(from, to)?;
                next.filled_quantity += quantity;
                next.status = to;
                quantity
            }
            OrderCommand::Cancel => {
                if !from.is_cancelable() {
                    return Err(OrderError::NotCancelable {
                        order_id: order.id.to_string(),
                        status: from,
                    });
                }
                next.status = OrderStatus::Canceled;
                Decimal::ZERO
            }
            OrderCommand::Reject { reason } => {
                Self::validate_transition(from, OrderStatus::Rejected)?;
                next.status = OrderStatus::Rejected;
                next.reject_reason = Some(reason.clone());
                Decimal::ZERO
            }
        };

        next.version = order.version + 1;
        next.updated_at = at;
        let event = OrderEvent::for_order(&next, delta);

        Ok(Transition {
            from,
            order: next,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;
    use crate::domain::order::{AccountId, ErrorKind, Instrument, OrderId, Side};

    fn order(quantity: Decimal) -> Order {
        Order::new(
            OrderId::new("ord-1"),
            AccountId::new("acc-1"),
            Instrument::parse("EURUSD").unwrap(),
            Side::Buy,
            quantity,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn fill(order: &Order, quantity: Decimal) -> Result<Transition, OrderError> {
        OrderStateMachine::apply(order, &OrderCommand::Fill { quantity }, Utc::now())
    }

    fn terminal(status: OrderStatus) -> Order {
        let pending = order(dec!(100));
        let command = match status {
            OrderStatus::Filled => OrderCommand::Fill {
                quantity: dec!(100),
            },
            OrderStatus::Canceled => OrderCommand::Cancel,
            OrderStatus::Rejected => OrderCommand::Reject {
                reason: "no liquidity".to_string(),
            },
            other => panic!("{other} is not terminal"),
        };
        OrderStateMachine::apply(&pending, &command, Utc::now())
            .unwrap()
            .order
    }

    #[test_case(OrderStatus::Pending, OrderStatus::PartiallyFilled, true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Filled, true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Rejected, true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Canceled, true)]
    #[test_case(OrderStatus::Pending, OrderStatus::Pending, false)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled, true)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Filled, true)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Canceled, true)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Rejected, false)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Pending, false)]
    #[test_case(OrderStatus::Filled, OrderStatus::Canceled, false)]
    #[test_case(OrderStatus::Canceled, OrderStatus::Filled, false)]
    #[test_case(OrderStatus::Rejected, OrderStatus::Pending, false)]
    fn transition_table(from: OrderStatus, to: OrderStatus, valid: bool) {
        assert_eq!(OrderStateMachine::is_valid_transition(from, to), valid);
        assert_eq!(OrderStateMachine::validate_transition(from, to).is_ok(), valid);
    }

    #[test]
    fn next_states_agree_with_edge_table() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    OrderStateMachine::valid_next_states(from).contains(&to),
                    OrderStateMachine::is_valid_transition(from, to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn no_transitions_from_terminal_states() {
        for status in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            assert!(OrderStateMachine::valid_next_states(status).is_empty());
        }
    }

    #[test]
    fn transition_error_reason_terminal_states() {
        let reason =
            OrderStateMachine::transition_error_reason(OrderStatus::Filled, OrderStatus::Canceled);
        assert!(reason.contains("already filled"));
    }

    #[test]
    fn partial_then_full_fill() {
        let pending = order(dec!(100));

        let first = fill(&pending, dec!(40)).unwrap();
        assert_eq!(first.from, OrderStatus::Pending);
        assert_eq!(first.order.status(), OrderStatus::PartiallyFilled);
        assert_eq!(first.order.filled_quantity(), dec!(40));
        assert_eq!(first.order.version(), 1);
        assert_eq!(first.event.delta, dec!(40));
        assert_eq!(first.event.version, 1);

        let second = fill(&first.order, dec!(60)).unwrap();
        assert_eq!(second.order.status(), OrderStatus::Filled);
        assert_eq!(second.order.filled_quantity(), dec!(100));
        assert_eq!(second.order.version(), 2);
        assert_eq!(second.event.delta, dec!(60));
        assert_eq!(second.event.filled_quantity, dec!(100));
    }

    #[test]
    fn apply_does_not_mutate_input() {
        let pending = order(dec!(100));
        let before = pending.clone();
        let _ = fill(&pending, dec!(10)).unwrap();
        assert_eq!(pending, before);
    }

    #[test]
    fn apply_stamps_updated_at() {
        let pending = order(dec!(100));
        let at = pending.created_at() + chrono::Duration::seconds(5);
        let next = OrderStateMachine::apply(&pending, &OrderCommand::Cancel, at).unwrap();
        assert_eq!(next.order.updated_at(), at);
        assert_eq!(next.order.created_at(), pending.created_at());
        assert_eq!(next.event.timestamp, at);
    }

    #[test]
    fn fill_exceeding_remaining_is_invalid() {
        let pending = order(dec!(100));
        let partial = fill(&pending, dec!(70)).unwrap().order;

        let err = fill(&partial, dec!(31)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(err.to_string().contains("exceeds remaining"));
    }

    #[test_case(dec!(0) ; "zero")]
    #[test_case(dec!(-1) ; "negative")]
    fn non_positive_fill_is_invalid(quantity: Decimal) {
        let err = fill(&order(dec!(100)), quantity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn cancel_from_active_states() {
        let pending = order(dec!(100));
        let canceled = OrderStateMachine::apply(&pending, &OrderCommand::Cancel, Utc::now())
            .unwrap();
        assert_eq!(canceled.order.status(), OrderStatus::Canceled);
        assert_eq!(canceled.event.delta, Decimal::ZERO);

        let partial = fill(&pending, dec!(25)).unwrap().order;
        let canceled = OrderStateMachine::apply(&partial, &OrderCommand::Cancel, Utc::now())
            .unwrap();
        assert_eq!(canceled.order.status(), OrderStatus::Canceled);
        assert_eq!(canceled.order.filled_quantity(), dec!(25));
        assert_eq!(canceled.order.version(), 2);
    }

    #[test_case(OrderStatus::Filled)]
    #[test_case(OrderStatus::Canceled)]
    #[test_case(OrderStatus::Rejected)]
    fn cancel_from_terminal_is_not_cancelable(status: OrderStatus) {
        let done = terminal(status);
        let err = OrderStateMachine::apply(&done, &OrderCommand::Cancel, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OrderNotCancelable);
    }

    #[test_case(OrderStatus::Filled)]
    #[test_case(OrderStatus::Canceled)]
    #[test_case(OrderStatus::Rejected)]
    fn fill_from_terminal_is_invalid(status: OrderStatus) {
        let done = terminal(status);
        let err = fill(&done, dec!(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn reject_only_from_pending() {
        let pending = order(dec!(100));
        let reject = OrderCommand::Reject {
            reason: "insufficient margin".to_string(),
        };

        let rejected = OrderStateMachine::apply(&pending, &reject, Utc::now()).unwrap();
        assert_eq!(rejected.order.status(), OrderStatus::Rejected);
        assert_eq!(rejected.order.reject_reason(), Some("insufficient margin"));
        assert_eq!(rejected.event.reason.as_deref(), Some("insufficient margin"));

        let partial = fill(&pending, dec!(10)).unwrap().order;
        let err = OrderStateMachine::apply(&partial, &reject, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    fn command_strategy() -> impl Strategy<Value = OrderCommand> {
        prop_oneof![
            (-5i64..120).prop_map(|q| OrderCommand::Fill {
                quantity: Decimal::from(q)
            }),
            Just(OrderCommand::Cancel),
            Just(OrderCommand::Reject {
                reason: "random".to_string()
            }),
        ]
    }

    proptest! {
        #[test]
        fn any_command_sequence_preserves_invariants(
            commands in prop::collection::vec(command_strategy(), 0..20)
        ) {
            let mut current = order(dec!(100));
            for command in &commands {
                match OrderStateMachine::apply(&current, command, Utc::now()) {
                    Ok(transition) => {
                        prop_assert!(OrderStateMachine::is_valid_transition(
                            current.status(),
                            transition.order.status()
                        ));
                        prop_assert_eq!(transition.order.version(), current.version() + 1);
                        prop_assert!(transition.order.filled_quantity() <= transition.order.quantity());
                        prop_assert!(transition.order.filled_quantity() >= current.filled_quantity());
                        prop_assert_eq!(
                            transition.event.delta,
                            transition.order.filled_quantity() - current.filled_quantity()
                        );
                        current = transition.order;
                    }
                    Err(_) => {
                        // Rejected commands leave nothing behind; `current` is unchanged.
                    }
                }
            }
            prop_assert!(current.filled_quantity() <= current.quantity());
            prop_assert_eq!(
                current.status() == OrderStatus::Filled,
                current.filled_quantity() == current.quantity()
            );
        }
    }
}
