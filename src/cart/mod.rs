//! Customer cart: menu item snapshots, quantities and notes for one restaurant.

pub mod storage;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::MenuItemEntity;

pub use storage::{CartStorage, FileStorage, MemoryStorage, StorageError};

const STORAGE_KEY_PREFIX: &str = "cart-storage";
const MAX_SESSION_LEN: usize = 64;

/// Upper bound of a single line's quantity.
pub const MAX_LINE_QUANTITY: i32 = 999;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Invalid cart session `{0}`")]
    InvalidSession(String),

    #[error("Cart registry lock poisoned")]
    Poisoned,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub menu_item: MenuItemEntity,
    pub quantity: i32,
    pub notes: Option<String>,
}

impl CartLine {
    pub fn subtotal(&self) -> i64 {
        self.menu_item.price.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    pub items: Vec<CartLine>,
    pub restaurant_id: Option<Uuid>,
    pub restaurant_slug: Option<String>,
}

/// A cart bound to one storage key. Every mutation is written through to storage;
/// a failed write is logged and the in-memory state stays authoritative.
#[derive(Debug)]
pub struct CartStore {
    key: String,
    state: CartState,
    storage: Arc<dyn CartStorage>,
}

impl CartStore {
    /// Restores the cart saved under `key`, or starts an empty one.
    pub fn open(key: impl Into<String>, storage: Arc<dyn CartStorage>) -> Self {
        let key = key.into();
        let state = storage.load(&key).unwrap_or_default();
        Self { key, state, storage }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.state.items
    }

    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> {
        self.state.items.iter().find(|line| line.id == line_id)
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    pub fn restaurant_id(&self) -> Option<Uuid> {
        self.state.restaurant_id
    }

    pub fn restaurant_slug(&self) -> Option<&str> {
        self.state.restaurant_slug.as_deref()
    }

    /// Adds `quantity` of `menu_item` and returns the id of the line holding it.
    ///
    /// An item from another restaurant empties the cart first and rebinds it; the
    /// slug is unknown until [`CartStore::set_restaurant_info`] is called. Adding an
    /// item already in the cart bumps that line and keeps its existing note. Line
    /// quantities never exceed [`MAX_LINE_QUANTITY`].
    pub fn add_item(
        &mut self,
        menu_item: MenuItemEntity,
        quantity: i32,
        notes: Option<String>,
    ) -> Uuid {
        if self.state.restaurant_id != Some(menu_item.restaurant_id) {
            if !self.state.items.is_empty() {
                debug!(
                    "Cart {} switches restaurant, dropping {} lines",
                    self.key,
                    self.state.items.len()
                );
            }
            self.state.items.clear();
            self.state.restaurant_id = Some(menu_item.restaurant_id);
            self.state.restaurant_slug = None;
        }

        let line_id = match self
            .state
            .items
            .iter_mut()
            .find(|line| line.menu_item.id == menu_item.id)
        {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
                line.id
            }
            None => {
                let id = Uuid::new_v4();
                self.state.items.push(CartLine {
                    id,
                    menu_item,
                    quantity: quantity.min(MAX_LINE_QUANTITY),
                    notes,
                });
                id
            }
        };

        self.persist();
        line_id
    }

    pub fn remove_item(&mut self, line_id: Uuid) {
        let before = self.state.items.len();
        self.state.items.retain(|line| line.id != line_id);
        if self.state.items.len() != before {
            self.persist();
        }
    }

    /// Sets the quantity, capped at [`MAX_LINE_QUANTITY`]. Callers decide what a
    /// quantity below one means.
    pub fn update_item_quantity(&mut self, line_id: Uuid, quantity: i32) {
        if let Some(line) = self.line_mut(line_id) {
            line.quantity = quantity.min(MAX_LINE_QUANTITY);
            self.persist();
        }
    }

    pub fn update_item_notes(&mut self, line_id: Uuid, notes: Option<String>) {
        if let Some(line) = self.line_mut(line_id) {
            line.notes = notes;
            self.persist();
        }
    }

    /// Empties the lines. The restaurant binding is kept.
    pub fn clear_cart(&mut self) {
        self.state.items.clear();
        self.persist();
    }

    /// Rebinds the cart without touching its lines.
    pub fn set_restaurant_info(&mut self, restaurant_id: Uuid, slug: impl Into<String>) {
        self.state.restaurant_id = Some(restaurant_id);
        self.state.restaurant_slug = Some(slug.into());
        self.persist();
    }

    pub fn total(&self) -> i64 {
        self.state
            .items
            .iter()
            .map(CartLine::subtotal)
            .fold(0, i64::saturating_add)
    }

    fn line_mut(&mut self, line_id: Uuid) -> Option<&mut CartLine> {
        self.state.items.iter_mut().find(|line| line.id == line_id)
    }

    fn persist(&self) {
        if let Err(err) = self.storage.save(&self.key, &self.state) {
            warn!("Failed to persist cart {}: {}", self.key, err);
        }
    }
}

/// Owner of every open customer cart, one exclusive [`CartStore`] per session.
#[derive(Clone)]
pub struct CartSessions {
    storage: Arc<dyn CartStorage>,
    open: Arc<Mutex<HashMap<String, Arc<AsyncMutex<CartStore>>>>>,
}

impl CartSessions {
    pub fn new(storage: Arc<dyn CartStorage>) -> Self {
        Self {
            storage,
            open: Arc::default(),
        }
    }

    pub fn storage_key(session: &str) -> String {
        format!("{STORAGE_KEY_PREFIX}.{session}")
    }

    /// Locks the session's cart, restoring it from storage on first use.
    pub async fn open(&self, session: &str) -> Result<OwnedMutexGuard<CartStore>, CartError> {
        validate_session(session)?;

        let cart = {
            let mut open = self.open.lock().map_err(|_| CartError::Poisoned)?;
            open.entry(session.to_string())
                .or_insert_with(|| {
                    Arc::new(AsyncMutex::new(CartStore::open(
                        Self::storage_key(session),
                        self.storage.clone(),
                    )))
                })
                .clone()
        };

        Ok(cart.lock_owned().await)
    }
}

impl fmt::Debug for CartSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self.open.lock().map(|open| open.len()).unwrap_or_default();
        f.debug_struct("CartSessions")
            .field("storage", &self.storage)
            .field("open", &open)
            .finish()
    }
}

fn validate_session(session: &str) -> Result<(), CartError> {
    let valid = !session.is_empty()
        && session.len() <= MAX_SESSION_LEN
        && session
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(CartError::InvalidSession(session.to_string()))
    }
}
