//! WebSocket adapter: connection handling, per-connection queues and the
//! broadcaster that implements the delivery port.

mod broadcaster;
mod handler;
mod protocol;
mod queue;

pub use broadcaster::{BroadcasterConfig, DeliveryError, WebSocketBroadcaster};
pub use handler::ws_handler;
pub use protocol::{ClientMessage, InterestRequest, ResyncRequest, ServerMessage};
pub use queue::{DEFAULT_QUEUE_CAPACITY, OutboundQueue, PushOutcome};
