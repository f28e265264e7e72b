//! Bounded per-connection outbound queue.
//!
//! Publishers push without waiting; the connection's writer task drains in
//! batches. When full, the oldest queued order update is dropped and the
//! connection turns degraded until the client resyncs.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::protocol::ServerMessage;

/// Default queue capacity per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Result of [`OutboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Message queued.
    Queued,
    /// Message queued after dropping an older one.
    Dropped,
    /// Queue closed; message discarded.
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<ServerMessage>,
    degraded: bool,
    notice_pending: bool,
    episode_dropped: u64,
    total_dropped: u64,
    closed: bool,
}

/// Outbound messages for one WebSocket connection.
#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue `message` without waiting.
    pub fn push(&self, message: ServerMessage) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            let mut outcome = PushOutcome::Queued;
            if state.items.len() >= self.capacity {
                let victim = state
                    .items
                    .iter()
                    .position(ServerMessage::is_order_update)
                    .unwrap_or(0);
                state.items.remove(victim);
                state.total_dropped += 1;
                state.episode_dropped += 1;
                if !state.degraded {
                    state.degraded = true;
                    state.notice_pending = true;
                }
                outcome = PushOutcome::Dropped;
            }
            state.items.push_back(message);
            outcome
        };

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next batch to write.
    ///
    /// A pending degraded notice is placed in front of the batch. Returns
    /// `None` once the queue is closed and drained.
    pub async fn next_batch(&self) -> Option<Vec<ServerMessage>> {
        loop {
            {
                let mut state = self.state.lock();
                if state.notice_pending || !state.items.is_empty() {
                    let mut batch = Vec::with_capacity(state.items.len() + 1);
                    if state.notice_pending {
                        state.notice_pending = false;
                        batch.push(ServerMessage::Degraded {
                            dropped: state.episode_dropped,
                        });
                    }
                    batch.extend(state.items.drain(..));
                    return Some(batch);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Leave the degraded state (client resynced).
    pub fn clear_degraded(&self) {
        let mut state = self.state.lock();
        state.degraded = false;
        state.notice_pending = false;
        state.episode_dropped = 0;
    }

    /// Stop accepting messages and wake the writer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// True while updates have been lost since the last resync.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }

    /// Updates dropped over the connection's lifetime.
    #[must_use]
    pub fn total_dropped(&self) -> u64 {
        self.state.lock().total_dropped
    }

    /// Messages waiting to be written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// True if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// True once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
