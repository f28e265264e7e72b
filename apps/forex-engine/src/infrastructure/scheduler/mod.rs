//! Tick Scheduler Adapters
//!
//! - [`TokioTickScheduler`]: sleeps for the tick interval, then hands the tick
//!   to the engine loop started by [`spawn_tick_loop`]
//! - [`ManualTickScheduler`]: queues ticks until the caller runs them, for
//!   deterministic tests and demos

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FillTick, TickScheduler};
use crate::application::services::MatchingEngine;

/// Receiving end of a [`TokioTickScheduler`].
pub type TickReceiver = mpsc::UnboundedReceiver<FillTick>;

// =============================================================================
// Tokio
// =============================================================================

/// Delays each tick by a fixed interval on the tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioTickScheduler {
    tx: mpsc::UnboundedSender<FillTick>,
    interval: Duration,
}

impl TokioTickScheduler {
    /// Create a scheduler and the receiver the engine loop reads from.
    #[must_use]
    pub fn channel(interval: Duration) -> (Self, TickReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, interval }, rx)
    }

    /// Delay applied to every tick.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    fn enqueue(tx: &mpsc::UnboundedSender<FillTick>, tick: FillTick) {
        if let Err(err) = tx.send(tick) {
            tracing::debug!(order_id = %err.0.order_id, "Tick loop stopped, dropping tick");
        }
    }
}

impl TickScheduler for TokioTickScheduler {
    fn schedule(&self, tick: FillTick) {
        if self.interval.is_zero() {
            Self::enqueue(&self.tx, tick);
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(order_id = %tick.order_id, "No runtime for delayed tick, enqueueing now");
            Self::enqueue(&self.tx, tick);
            return;
        };

        let tx = self.tx.clone();
        let interval = self.interval;
        handle.spawn(async move {
            tokio::time::sleep(interval).await;
            Self::enqueue(&tx, tick);
        });
    }
}

/// Run ticks from `rx` until `cancel` fires or every scheduler is dropped.
///
/// Each tick runs in its own task, so a slow order never holds up others.
pub fn spawn_tick_loop(
    engine: Arc<MatchingEngine>,
    mut rx: TickReceiver,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Fill tick loop started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                tick = rx.recv() => {
                    let Some(tick) = tick else { break };
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        engine.run_tick(&tick);
                    });
                }
            }
        }
        tracing::info!("Fill tick loop stopped");
    })
}

// =============================================================================
// Manual
// =============================================================================

/// Collects ticks in FIFO order; nothing runs until the caller pops one.
#[derive(Debug, Default)]
pub struct ManualTickScheduler {
    queue: Mutex<VecDeque<FillTick>>,
}

impl ManualTickScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest pending tick.
    pub fn pop(&self) -> Option<FillTick> {
        self.queue.lock().pop_front()
    }

    /// Take every pending tick.
    pub fn drain(&self) -> Vec<FillTick> {
        self.queue.lock().drain(..).collect()
    }

    /// Pending ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl TickScheduler for ManualTickScheduler {
    fn schedule(&self, tick: FillTick) {
        self.queue.lock().push_back(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderId;

    fn tick(order: &str, n: u32) -> FillTick {
        FillTick {
            order_id: OrderId::new(order),
            expected_version: 0,
            tick: n,
        }
    }

    #[test]
    fn manual_scheduler_is_fifo() {
        let scheduler = ManualTickScheduler::new();
        scheduler.schedule(tick("a", 1));
        scheduler.schedule(tick("b", 1));

        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.pop(), Some(tick("a", 1)));
        assert_eq!(scheduler.drain(), vec![tick("b", 1)]);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn zero_interval_enqueues_immediately() {
        let (scheduler, mut rx) = TokioTickScheduler::channel(Duration::ZERO);
        scheduler.schedule(tick("a", 1));

        assert_eq!(rx.try_recv().ok(), Some(tick("a", 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_arrive_after_the_interval() {
        let (scheduler, mut rx) = TokioTickScheduler::channel(Duration::from_millis(250));
        scheduler.schedule(tick("a", 1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(received.ok().flatten(), Some(tick("a", 1)));
    }

    #[test]
    fn without_runtime_the_tick_is_not_lost() {
        let (scheduler, mut rx) = TokioTickScheduler::channel(Duration::from_secs(5));
        scheduler.schedule(tick("a", 2));

        assert_eq!(rx.try_recv().ok(), Some(tick("a", 2)));
    }
}
