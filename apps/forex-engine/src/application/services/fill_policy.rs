//! Fill Policies
//!
//! Built-in strategies for the simulated market:
//!
//! - [`RandomFillPolicy`]: seeded random rejects, waits, partial and full fills
//! - [`ImmediateFillPolicy`]: fills the whole remainder on the first tick
//! - [`ScriptedFillPolicy`]: replays a fixed queue of decisions

use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::application::ports::{FillDecision, FillPolicy};
use crate::domain::order::{Order, OrderStatus};

/// Reason attached to simulated liquidity rejects.
pub const NO_LIQUIDITY_REASON: &str = "insufficient liquidity";

// =============================================================================
// Random
// =============================================================================

/// Probabilities for [`RandomFillPolicy`].
///
/// Each tick rolls once: `reject`, then `wait`, then `full_fill`; anything
/// left over is a partial fill of a fraction drawn from
/// `partial_fraction_min..=partial_fraction_max` of the remaining quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomFillConfig {
    /// Chance a `PENDING` order is rejected.
    pub reject_probability: f64,
    /// Chance nothing happens this tick.
    pub wait_probability: f64,
    /// Chance the whole remainder fills.
    pub full_fill_probability: f64,
    /// Smallest partial fill, as a fraction of the remainder.
    pub partial_fraction_min: f64,
    /// Largest partial fill, as a fraction of the remainder.
    pub partial_fraction_max: f64,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for RandomFillConfig {
    fn default() -> Self {
        Self {
            reject_probability: 0.05,
            wait_probability: 0.15,
            full_fill_probability: 0.4,
            partial_fraction_min: 0.2,
            partial_fraction_max: 0.8,
            seed: None,
        }
    }
}

/// Random fills from a seeded RNG.
#[derive(Debug)]
pub struct RandomFillPolicy {
    config: RandomFillConfig,
    rng: Mutex<StdRng>,
}

impl RandomFillPolicy {
    /// Create a policy from `config`.
    #[must_use]
    pub fn new(config: RandomFillConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// The policy's configuration.
    #[must_use]
    pub const fn config(&self) -> &RandomFillConfig {
        &self.config
    }

    fn partial_quantity(&self, order: &Order, fraction: f64) -> Decimal {
        let remaining = order.remaining_quantity();
        let fraction = Decimal::from_f64_retain(fraction).unwrap_or(Decimal::ONE);
        remaining
            .checked_mul(fraction)
            .unwrap_or(remaining)
            .round_dp(order.quantity().scale())
    }
}

impl FillPolicy for RandomFillPolicy {
    fn decide(&self, order: &Order, _tick: u32) -> FillDecision {
        let cfg = &self.config;
        let (roll, fraction) = {
            let mut rng = self.rng.lock();
            let roll: f64 = rng.random();
            let fraction = if cfg.partial_fraction_min < cfg.partial_fraction_max {
                rng.random_range(cfg.partial_fraction_min..=cfg.partial_fraction_max)
            } else {
                cfg.partial_fraction_min
            };
            (roll, fraction)
        };

        let reject_below = cfg.reject_probability;
        let wait_below = reject_below + cfg.wait_probability;
        let full_below = wait_below + cfg.full_fill_probability;

        if roll < reject_below && order.status() == OrderStatus::Pending {
            return FillDecision::Reject(NO_LIQUIDITY_REASON.to_string());
        }
        if roll < wait_below {
            return FillDecision::Wait;
        }
        if roll < full_below {
            return FillDecision::Fill(order.remaining_quantity());
        }

        let quantity = self.partial_quantity(order, fraction);
        if quantity <= Decimal::ZERO {
            FillDecision::Wait
        } else {
            FillDecision::Fill(quantity)
        }
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

// =============================================================================
// Immediate
// =============================================================================

/// Fills the whole remaining quantity every time it is asked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateFillPolicy;

impl FillPolicy for ImmediateFillPolicy {
    fn decide(&self, order: &Order, _tick: u32) -> FillDecision {
        FillDecision::Fill(order.remaining_quantity())
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}

// =============================================================================
// Scripted
// =============================================================================

/// Replays queued decisions in order, then waits forever.
///
/// Shared across all orders: each `decide` call consumes the next entry.
#[derive(Debug, Default)]
pub struct ScriptedFillPolicy {
    script: Mutex<VecDeque<FillDecision>>,
}

impl ScriptedFillPolicy {
    /// Create a policy that will return `decisions` in order.
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = FillDecision>) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().collect()),
        }
    }

    /// Append a decision to the script.
    pub fn push(&self, decision: FillDecision) {
        self.script.lock().push_back(decision);
    }

    /// Decisions not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl FillPolicy for ScriptedFillPolicy {
    fn decide(&self, _order: &Order, _tick: u32) -> FillDecision {
        self.script.lock().pop_front().unwrap_or(FillDecision::Wait)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
