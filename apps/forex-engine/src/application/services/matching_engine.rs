//! Matching / Simulation Engine
//!
//! Drives accepted orders through fills and rejects, one deferred
//! [`FillTick`] at a time.
//!
//! # Tick
//!
//! 1. Load the latest order. Terminal or missing: nothing to do.
//! 2. While `PENDING`, make sure margin is reserved. Failure rejects the
//!    order with `insufficient margin`.
//! 3. Ask the [`FillPolicy`]. Fills are clamped to the remaining quantity.
//! 4. Commit through the state machine, then publish.
//! 5. `PARTIALLY_FILLED` or `Wait` schedules the next tick, up to
//!    `max_ticks`; after that the order rests until canceled or executed.
//!
//! Every tick re-reads the order, so a cancel committed between ticks always
//! wins over the next fill.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::application::metrics;
use crate::application::ports::{
    FillDecision, FillPolicy, FillTick, OrderStore, TickScheduler, commit_with_retry,
};
use crate::application::services::EventBus;
use crate::domain::account::MarginPolicy;
use crate::domain::order::{Order, OrderCommand, OrderError, OrderId, OrderStateMachine, OrderStatus};

/// Reason attached to margin rejects.
pub const INSUFFICIENT_MARGIN_REASON: &str = "insufficient margin";

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Ticks after which an unfinished order stops being worked.
    pub max_ticks: u32,
    /// Retries on version conflict before giving up.
    pub commit_retries: u32,
    /// Margin requirement per order.
    pub margin: MarginPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_ticks: 20,
            commit_retries: 3,
            margin: MarginPolicy::default(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Order missing or already terminal; nothing done.
    Inactive,
    /// A transition was committed; carries the resulting status.
    Advanced(OrderStatus),
    /// Policy said wait; next tick scheduled.
    Waited,
    /// Tick budget used up; the order rests as it is.
    Rested,
    /// Lost the race to a concurrent terminal transition.
    Superseded,
}

/// Simulated matching engine.
pub struct MatchingEngine {
    store: Arc<dyn OrderStore>,
    bus: Arc<EventBus>,
    scheduler: Arc<dyn TickScheduler>,
    policy: Arc<dyn FillPolicy>,
    config: SimulationConfig,
}

impl MatchingEngine {
    /// Create an engine.
    pub fn new(
        store: Arc<dyn OrderStore>,
        bus: Arc<EventBus>,
        scheduler: Arc<dyn TickScheduler>,
        policy: Arc<dyn FillPolicy>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            store,
            bus,
            scheduler,
            policy,
            config,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Start working a freshly accepted order.
    pub fn start(&self, order: &Order) {
        tracing::debug!(
            order_id = %order.id(),
            policy = self.policy.name(),
            "Scheduling first fill tick"
        );
        self.scheduler.schedule(FillTick {
            order_id: order.id().clone(),
            expected_version: order.version(),
            tick: 1,
        });
    }

    /// Run one fill tick.
    pub fn run_tick(&self, tick: &FillTick) -> TickOutcome {
        let started = Instant::now();
        let outcome = self.process_tick(tick);
        metrics::record_tick_duration(started.elapsed());

        tracing::debug!(
            order_id = %tick.order_id,
            tick = tick.tick,
            ?outcome,
            "Fill tick processed"
        );
        outcome
    }

    /// Fill the whole remaining quantity now.
    ///
    /// A `PENDING` order that cannot reserve margin is rejected instead and
    /// the rejected snapshot is returned.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown orders
    /// - `InvalidTransition` if the order is already terminal
    /// - `Conflict` if retries are exhausted
    pub fn execute(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        let order = self.store.get(order_id)?;

        if order.status() == OrderStatus::Pending
            && let Err(err) = self.ensure_margin(&order)
        {
            tracing::info!(order_id = %order_id, error = %err, "Execute refused by margin check");
            return self.reject(&order, INSUFFICIENT_MARGIN_REASON);
        }

        let fill_remainder = |current: &Order| {
            OrderStateMachine::apply(
                current,
                &OrderCommand::Fill {
                    quantity: current.remaining_quantity(),
                },
                Utc::now(),
            )
        };
        let (order, event) = commit_with_retry(
            self.store.as_ref(),
            order_id,
            self.config.commit_retries,
            &fill_remainder,
        )?;

        metrics::record_transition(order.status());
        self.bus.publish(event);
        tracing::info!(order_id = %order_id, "Order executed");
        Ok(order)
    }

    /// Release the margin held for the unfilled part of `order`.
    pub fn release_unfilled(&self, order: &Order) {
        let fraction = order.unfilled_fraction();
        if fraction <= Decimal::ZERO {
            return;
        }
        let released = self
            .store
            .release_margin(order.account_id(), order.id(), fraction);
        if released > Decimal::ZERO {
            tracing::debug!(
                order_id = %order.id(),
                account_id = %order.account_id(),
                %released,
                "Released unfilled margin"
            );
        }
    }

    // =========================================================================
    // Tick internals
    // =========================================================================

    fn process_tick(&self, tick: &FillTick) -> TickOutcome {
        let order = match self.store.get(&tick.order_id) {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(order_id = %tick.order_id, error = %err, "Fill tick for unknown order");
                return TickOutcome::Inactive;
            }
        };

        if !order.status().is_active() {
            // Full releases are idempotent; drop anything a racing tick left.
            if order.filled_quantity().is_zero() {
                self.release_unfilled(&order);
            }
            return TickOutcome::Inactive;
        }
        if order.version() != tick.expected_version {
            tracing::debug!(
                order_id = %tick.order_id,
                expected = tick.expected_version,
                actual = order.version(),
                "Order moved since tick was scheduled, continuing from latest"
            );
        }

        if order.status() == OrderStatus::Pending
            && let Err(err) = self.ensure_margin(&order)
        {
            tracing::info!(order_id = %order.id(), error = %err, "Margin check failed");
            return match self.reject(&order, INSUFFICIENT_MARGIN_REASON) {
                Ok(rejected) => TickOutcome::Advanced(rejected.status()),
                Err(_) => self.superseded(&order),
            };
        }

        match self.policy.decide(&order, tick.tick) {
            FillDecision::Wait => self.reschedule(&order, tick, TickOutcome::Waited),
            FillDecision::Reject(_) if order.status() == OrderStatus::PartiallyFilled => {
                self.reschedule(&order, tick, TickOutcome::Waited)
            }
            FillDecision::Reject(reason) => match self.reject(&order, &reason) {
                Ok(rejected) => TickOutcome::Advanced(rejected.status()),
                Err(_) => self.superseded(&order),
            },
            FillDecision::Fill(quantity) => self.fill(&order, tick, quantity),
        }
    }

    fn fill(&self, order: &Order, tick: &FillTick, quantity: Decimal) -> TickOutcome {
        if quantity.min(order.remaining_quantity()) <= Decimal::ZERO {
            return self.reschedule(order, tick, TickOutcome::Waited);
        }

        let clamped_fill = |current: &Order| {
            OrderStateMachine::apply(
                current,
                &OrderCommand::Fill {
                    quantity: quantity.min(current.remaining_quantity()),
                },
                Utc::now(),
            )
        };

        match commit_with_retry(
            self.store.as_ref(),
            order.id(),
            self.config.commit_retries,
            &clamped_fill,
        ) {
            Ok((filled, event)) => {
                metrics::record_transition(filled.status());
                self.bus.publish(event);
                tracing::info!(
                    order_id = %filled.id(),
                    status = %filled.status(),
                    filled = %filled.filled_quantity(),
                    quantity = %filled.quantity(),
                    "Order filled"
                );
                if filled.status() == OrderStatus::PartiallyFilled {
                    self.reschedule(&filled, tick, TickOutcome::Advanced(filled.status()))
                } else {
                    TickOutcome::Advanced(filled.status())
                }
            }
            Err(err) => {
                tracing::debug!(order_id = %order.id(), error = %err, "Fill commit failed");
                self.superseded(order)
            }
        }
    }

    fn reject(&self, order: &Order, reason: &str) -> Result<Order, OrderError> {
        let reject = |current: &Order| {
            OrderStateMachine::apply(
                current,
                &OrderCommand::Reject {
                    reason: reason.to_string(),
                },
                Utc::now(),
            )
        };
        let (rejected, event) = commit_with_retry(
            self.store.as_ref(),
            order.id(),
            self.config.commit_retries,
            &reject,
        )?;

        metrics::record_transition(rejected.status());
        self.bus.publish(event);
        self.release_unfilled(&rejected);
        tracing::info!(order_id = %rejected.id(), reason, "Order rejected");
        Ok(rejected)
    }

    fn ensure_margin(&self, order: &Order) -> Result<Decimal, OrderError> {
        let required = self.config.margin.required_margin(order)?;
        self.store
            .reserve_margin(order.account_id(), order.id(), required)
    }

    fn reschedule(&self, order: &Order, tick: &FillTick, outcome: TickOutcome) -> TickOutcome {
        if tick.tick >= self.config.max_ticks {
            tracing::info!(
                order_id = %order.id(),
                ticks = tick.tick,
                status = %order.status(),
                "Tick budget exhausted, order resting"
            );
            return TickOutcome::Rested;
        }
        self.scheduler.schedule(FillTick {
            order_id: order.id().clone(),
            expected_version: order.version(),
            tick: tick.tick + 1,
        });
        outcome
    }

    /// A commit failed. Only a tick that saw `PENDING` can have reserved
    /// margin; if the order went terminal underneath it, give that back.
    fn superseded(&self, order: &Order) -> TickOutcome {
        if order.status() != OrderStatus::Pending {
            return TickOutcome::Superseded;
        }
        match self.store.get(order.id()) {
            Ok(latest) if latest.status().is_terminal() => {
                self.release_unfilled(&latest);
                TickOutcome::Superseded
            }
            Ok(_) | Err(_) => TickOutcome::Superseded,
        }
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
