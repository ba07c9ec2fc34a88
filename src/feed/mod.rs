//! Order change feed.
//!
//! ```text
//! orders trigger ──pg_notify──▶ OrderChangeListener ──publish──▶ ChangeHub
//!                                                                  │
//!                                    subscribe(OrderFilter) ◀──────┘
//!                                          │
//!                                    Subscription ──▶ OrderState / OrderListState
//! ```

pub mod listener;
pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::OrderEntity;

pub use listener::OrderChangeListener;
pub use state::{OrderListState, OrderState};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed change payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0:?} change carries no `{1}` row")]
    MissingRow(ChangeKind, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Change notification as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

/// A decoded row change. Deletions carry the row as it was before removal.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Inserted(T),
    Updated(T),
    Deleted(T),
}

impl<T> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Inserted(_) => ChangeKind::Insert,
            ChangeEvent::Updated(_) => ChangeKind::Update,
            ChangeEvent::Deleted(_) => ChangeKind::Delete,
        }
    }

    pub fn row(&self) -> &T {
        match self {
            ChangeEvent::Inserted(row) | ChangeEvent::Updated(row) | ChangeEvent::Deleted(row) => {
                row
            }
        }
    }
}

impl<T: DeserializeOwned> TryFrom<RawChange> for ChangeEvent<T> {
    type Error = FeedError;

    fn try_from(raw: RawChange) -> Result<Self, Self::Error> {
        let (slot, row) = match raw.event_type {
            ChangeKind::Insert | ChangeKind::Update => ("new", raw.new),
            ChangeKind::Delete => ("old", raw.old),
        };

        let row = match row {
            Some(Value::Null) | None => return Err(FeedError::MissingRow(raw.event_type, slot)),
            Some(row) => serde_json::from_value(row)?,
        };

        Ok(match raw.event_type {
            ChangeKind::Insert => ChangeEvent::Inserted(row),
            ChangeKind::Update => ChangeEvent::Updated(row),
            ChangeKind::Delete => ChangeEvent::Deleted(row),
        })
    }
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    pub fn decode(payload: &str) -> Result<Self, FeedError> {
        let raw: RawChange = serde_json::from_str(payload)?;
        raw.try_into()
    }
}

pub type OrderChange = ChangeEvent<OrderEntity>;

/// Which order rows a subscription cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    Order(Uuid),
    Restaurant(Uuid),
}

impl OrderFilter {
    pub fn matches(&self, order: &OrderEntity) -> bool {
        match self {
            OrderFilter::Order(id) => order.id == *id,
            OrderFilter::Restaurant(id) => order.restaurant_id == *id,
        }
    }
}

impl fmt::Display for OrderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderFilter::Order(id) => write!(f, "order={id}"),
            OrderFilter::Restaurant(id) => write!(f, "restaurant={id}"),
        }
    }
}

/// In-process fan-out of order changes.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<OrderChange>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscriptions received the change.
    pub fn publish(&self, change: OrderChange) -> usize {
        self.tx.send(change).unwrap_or_default()
    }

    pub fn subscribe(&self, filter: OrderFilter) -> Subscription {
        debug!("Opening order change subscription ({})", filter);
        Subscription {
            filter,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Filtered view on the hub. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    filter: OrderFilter,
    rx: broadcast::Receiver<OrderChange>,
}

impl Subscription {
    pub fn filter(&self) -> OrderFilter {
        self.filter
    }

    /// Next matching change, or `None` once the hub is gone.
    ///
    /// Changes dropped because this subscriber fell behind are skipped, not replayed.
    pub async fn recv(&mut self) -> Option<OrderChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(change.row()) => return Some(change),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Order change subscription ({}) lagged, {} changes lost",
                        self.filter, skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Closing order change subscription ({})", self.filter);
    }
}
