//! WebSocket wire protocol.
//!
//! JSON text frames tagged by `type`. Field names are camelCase.
//!
//! Client to server: `subscribe`, `unsubscribe`, `resync`, `get_orders`,
//! `ping`. Bare `ping` and `get_orders` text frames are accepted too.
//! Server to client: `order_update`, `subscribed`, `snapshot`, `degraded`,
//! `pong`, `error`.

use serde::{Deserialize, Serialize};

use crate::application::services::OrderSnapshot;
use crate::domain::order::{AccountId, ErrorKind, OrderError, OrderEvent, OrderId};
use crate::domain::subscription::Interest;

// =============================================================================
// Client Messages
// =============================================================================

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Add interest.
    Subscribe(InterestRequest),
    /// Remove interest. An empty request removes everything.
    Unsubscribe(InterestRequest),
    /// Ask for current snapshots and leave the degraded state.
    Resync(ResyncRequest),
    /// Snapshot of every order.
    GetOrders,
    /// Keep-alive.
    Ping,
}

impl ClientMessage {
    /// Parse a text frame: tagged JSON, or the bare words `ping` and
    /// `get_orders`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for anything else.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match text.trim() {
            "ping" => Ok(Self::Ping),
            "get_orders" => Ok(Self::GetOrders),
            json => serde_json::from_str(json),
        }
    }
}

/// Body of `subscribe` / `unsubscribe`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestRequest {
    /// Specific orders.
    #[serde(default)]
    pub order_ids: Vec<OrderId>,
    /// A single account.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Several accounts.
    #[serde(default)]
    pub account_ids: Vec<String>,
    /// Every order in the system.
    #[serde(default)]
    pub all: bool,
}

impl InterestRequest {
    /// Convert to a registry [`Interest`].
    ///
    /// # Errors
    ///
    /// Returns `Validation` if an account ID is blank.
    pub fn to_interest(&self) -> Result<Interest, OrderError> {
        let account_ids = self
            .account_id
            .iter()
            .chain(&self.account_ids)
            .map(|raw| AccountId::parse(raw))
            .collect::<Result<_, _>>()?;

        Ok(Interest {
            order_ids: self.order_ids.iter().cloned().collect(),
            account_ids,
            all: self.all,
        })
    }
}

/// Body of `resync`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    /// Orders to snapshot; empty means everything the connection follows.
    #[serde(default)]
    pub order_ids: Vec<OrderId>,
}

// =============================================================================
// Server Messages
// =============================================================================

/// A message sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A committed order change.
    OrderUpdate(OrderEvent),
    /// The connection's interest after a subscribe or unsubscribe.
    Subscribed {
        /// Followed orders, sorted.
        order_ids: Vec<OrderId>,
        /// Followed accounts, sorted.
        account_ids: Vec<AccountId>,
        /// Following everything.
        all: bool,
    },
    /// Reply to `resync`.
    Snapshot(OrderSnapshot),
    /// Updates were dropped because the client fell behind.
    Degraded {
        /// Updates lost since the connection last resynced.
        dropped: u64,
    },
    /// Reply to `ping`.
    Pong,
    /// A client message could not be handled.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ServerMessage {
    /// True for `order_update`, the only kind the queue may drop.
    #[must_use]
    pub const fn is_order_update(&self) -> bool {
        matches!(self, Self::OrderUpdate(_))
    }

    /// Error reply for `err`.
    #[must_use]
    pub fn error(err: &OrderError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Interest> for ServerMessage {
    fn from(interest: Interest) -> Self {
        let mut order_ids: Vec<OrderId> = interest.order_ids.into_iter().collect();
        let mut account_ids: Vec<AccountId> = interest.account_ids.into_iter().collect();
        order_ids.sort();
        account_ids.sort();
        Self::Subscribed {
            order_ids,
            account_ids,
            all: interest.all,
        }
    }
}
