//! Tick Scheduler Port (Driven Port)
//!
//! Matching work is expressed as discrete, deferred work items rather than
//! nested calls, so cancel and fill commands interleave at tick boundaries.

use crate::domain::order::OrderId;

/// One deferred matching step for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillTick {
    /// Order to work on.
    pub order_id: OrderId,
    /// Version the scheduler saw when it enqueued the tick.
    pub expected_version: u64,
    /// 1-based tick number for this order.
    pub tick: u32,
}

/// Defers [`FillTick`]s until the engine should run them.
pub trait TickScheduler: Send + Sync {
    /// Queue `tick` for later execution.
    fn schedule(&self, tick: FillTick);
}
