use std::sync::Arc;

use crate::{backend::Backend, cart::CartSessions, feed::ChangeHub};

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub carts: CartSessions,
    pub changes: ChangeHub,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, carts: CartSessions, changes: ChangeHub) -> Self {
        Self {
            backend,
            carts,
            changes,
        }
    }
}
