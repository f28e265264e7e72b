//! WebSocket connection handler.
//!
//! Each connection gets a writer task draining its outbound queue and a
//! reader loop handling client messages. Either side ending tears the
//! connection down and deregisters it.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::broadcaster::{DeliveryError, WebSocketBroadcaster};
use super::protocol::{ClientMessage, InterestRequest, ResyncRequest, ServerMessage};
use super::queue::OutboundQueue;
use crate::application::ports::OrderFilter;
use crate::domain::order::{OrderError, OrderId};
use crate::domain::subscription::ConnectionId;
use crate::infrastructure::http::AppState;

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection, queue) = state.broadcaster.register();
    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(
        sink,
        queue,
        Arc::clone(&state.broadcaster),
        connection,
    ));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if !handle_text(&state, connection, text.as_str()) {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection, error = %err, "WebSocket read failed");
                break;
            }
        }
    }

    state.broadcaster.disconnect(connection, "client closed");
    if let Err(err) = writer.await {
        tracing::debug!(connection, error = %err, "WebSocket writer task ended abnormally");
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    queue: Arc<OutboundQueue>,
    broadcaster: Arc<WebSocketBroadcaster>,
    connection: ConnectionId,
) {
    while let Some(batch) = queue.next_batch().await {
        for message in batch {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(source) => {
                    broadcaster.report_failure(connection, &DeliveryError::Encode { connection, source });
                    return;
                }
            };
            if let Err(err) = sink.send(Message::Text(text.into())).await {
                broadcaster.report_failure(
                    connection,
                    &DeliveryError::ConnectionDeliveryFailure {
                        connection,
                        reason: err.to_string(),
                    },
                );
                return;
            }
        }
    }
    let _ = sink.close().await;
}

/// Handle one text frame. Returns `false` once the broadcaster has cut the
/// connection; nothing may touch the registry for it after that.
fn handle_text(state: &AppState, connection: ConnectionId, text: &str) -> bool {
    let Some(queue) = state.broadcaster.queue(connection) else {
        tracing::debug!(connection, "Frame after disconnect ignored");
        return false;
    };

    let reply = match ClientMessage::parse(text) {
        Ok(ClientMessage::Subscribe(request)) => subscribe(state, connection, &request),
        Ok(ClientMessage::Unsubscribe(request)) => unsubscribe(state, connection, &request),
        Ok(ClientMessage::Resync(request)) => resync(state, connection, &queue, &request),
        Ok(ClientMessage::GetOrders) => {
            let ids: Vec<OrderId> = state
                .gateway
                .list(&OrderFilter::default())
                .iter()
                .map(|order| order.id().clone())
                .collect();
            ServerMessage::Snapshot(state.gateway.snapshot(&ids))
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(err) => {
            tracing::debug!(connection, error = %err, "Unreadable client message");
            ServerMessage::error(&OrderError::validation("message", err.to_string()))
        }
    };
    state.broadcaster.send(connection, reply);
    true
}

fn subscribe(state: &AppState, connection: ConnectionId, request: &InterestRequest) -> ServerMessage {
    let interest = match request.to_interest() {
        Ok(interest) if interest.is_empty() => {
            return ServerMessage::error(&OrderError::validation(
                "subscribe",
                "expected orderIds, accountId, accountIds or all",
            ));
        }
        Ok(interest) => interest,
        Err(err) => return ServerMessage::error(&err),
    };

    let merged = state.registry.subscribe(connection, &interest);
    tracing::debug!(
        connection,
        orders = merged.order_ids.len(),
        accounts = merged.account_ids.len(),
        all = merged.all,
        "Subscription updated"
    );
    ServerMessage::from(merged)
}

fn unsubscribe(state: &AppState, connection: ConnectionId, request: &InterestRequest) -> ServerMessage {
    let interest = match request.to_interest() {
        Ok(interest) => interest,
        Err(err) => return ServerMessage::error(&err),
    };

    if interest.is_empty() {
        state.registry.unsubscribe(connection);
        return ServerMessage::from(state.registry.interest(connection));
    }
    ServerMessage::from(state.registry.remove_interest(connection, &interest))
}

fn resync(
    state: &AppState,
    connection: ConnectionId,
    queue: &OutboundQueue,
    request: &ResyncRequest,
) -> ServerMessage {
    queue.clear_degraded();

    let order_ids = if request.order_ids.is_empty() {
        followed_orders(state, connection)
    } else {
        request.order_ids.clone()
    };
    ServerMessage::Snapshot(state.gateway.snapshot(&order_ids))
}

/// Every order the connection currently follows, oldest first.
fn followed_orders(state: &AppState, connection: ConnectionId) -> Vec<OrderId> {
    let interest = state.registry.interest(connection);
    if interest.all {
        return state
            .gateway
            .list(&OrderFilter::default())
            .iter()
            .map(|order| order.id().clone())
            .collect();
    }

    let mut ids: Vec<OrderId> = interest.order_ids.into_iter().collect();
    ids.sort();
    for account in interest.account_ids {
        let filter = OrderFilter {
            account_id: Some(account),
            status: None,
        };
        for order in state.gateway.list(&filter) {
            if !ids.contains(order.id()) {
                ids.push(order.id().clone());
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::application::services::ImmediateFillPolicy;
    use crate::infrastructure::config::{EngineConfig, EngineContainer};
    use crate::infrastructure::scheduler::ManualTickScheduler;

    fn state() -> AppState {
        let container = EngineContainer::build(
            &EngineConfig::default(),
            Arc::new(ManualTickScheduler::new()),
            Arc::new(ImmediateFillPolicy),
        );
        container.app_state(CancellationToken::new())
    }

    #[test]
    fn subscribe_after_forced_disconnect_touches_nothing() {
        let state = state();
        let (connection, _) = state.broadcaster.register();
        state.broadcaster.disconnect(connection, "too many dropped updates");

        let keep_reading = handle_text(&state, connection, r#"{"type":"subscribe","all":true}"#);

        assert!(!keep_reading);
        assert_eq!(state.registry.stats().connection_count, 0);
        assert!(state.registry.interest(connection).is_empty());
    }

    #[test]
    fn live_connection_subscribes() {
        let state = state();
        let (connection, queue) = state.broadcaster.register();

        assert!(handle_text(&state, connection, r#"{"type":"subscribe","all":true}"#));

        assert!(state.registry.interest(connection).all);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn bare_get_orders_snapshots_every_order() {
        let state = state();
        for account in ["a", "b"] {
            state
                .gateway
                .submit(crate::application::services::SubmitOrder {
                    account: account.to_string(),
                    instrument: "EURUSD".to_string(),
                    side: "buy".to_string(),
                    quantity: rust_decimal::Decimal::TEN,
                    price: None,
                })
                .unwrap();
        }
        let (connection, queue) = state.broadcaster.register();

        assert!(handle_text(&state, connection, "get_orders"));
        assert!(handle_text(&state, connection, "ping"));

        let items = queue.len();
        assert_eq!(items, 2);
        let queued = tokio_test::block_on(queue.next_batch()).unwrap();
        match &queued[0] {
            ServerMessage::Snapshot(snapshot) => assert_eq!(snapshot.orders.len(), 2),
            other => panic!("expected snapshot, got {other:?}"),
        }
        assert_eq!(queued[1], ServerMessage::Pong);
    }
}
