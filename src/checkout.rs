//! Turns a cart into a placed order.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    backend::{Backend, BackendError},
    cart::{CartStore, MAX_LINE_QUANTITY},
    models::{CreateOrderEntity, CreateOrderItemEntity, OrderEntity, OrderItemEntity},
    status::OrderStatus,
};

const MIN_PHONE_DIGITS: usize = 9;
const MAX_PHONE_DIGITS: usize = 15;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart is not bound to a restaurant")]
    NoRestaurant,

    #[error("Cart line {0} has a quantity outside 1..={max}", max = MAX_LINE_QUANTITY)]
    InvalidQuantity(Uuid),

    #[error("Cart line {0} belongs to another restaurant")]
    MixedRestaurants(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Customer details entered at checkout.
#[derive(Deserialize, Debug, Clone, Default, ToSchema)]
pub struct CheckoutForm {
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub table_number: Option<String>,
}

impl CheckoutForm {
    /// Trims every field and drops empty optional ones.
    pub fn normalize(self) -> Result<Self, CheckoutError> {
        let customer_name = self.customer_name.trim().to_string();
        if customer_name.is_empty() {
            return Err(CheckoutError::Validation("Customer name is required".into()));
        }

        let customer_phone = non_blank(self.customer_phone);
        if let Some(phone) = &customer_phone {
            validate_phone(phone)?;
        }

        Ok(Self {
            customer_name,
            customer_phone,
            table_number: non_blank(self.table_number),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn validate_phone(phone: &str) -> Result<(), CheckoutError> {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let well_formed = body.chars().all(|c| c.is_ascii_digit() || c == ' ');
    let digits = body.chars().filter(char::is_ascii_digit).count();

    if !well_formed || !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return Err(CheckoutError::Validation(format!(
            "Invalid phone number `{phone}`"
        )));
    }

    Ok(())
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PlacedOrder {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
    /// Where the customer follows the order.
    pub status_path: String,
}

pub fn status_path(order_id: Uuid) -> String {
    format!("/orders/{order_id}")
}

/// Writes the cart as a `received` order and clears the cart.
///
/// The cart is only cleared once the backend has stored the order and all of
/// its items; on any error it is left exactly as it was.
pub async fn submit_order(
    backend: &dyn Backend,
    cart: &mut CartStore,
    form: CheckoutForm,
) -> Result<PlacedOrder, CheckoutError> {
    let form = form.normalize()?;

    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    let restaurant_id = cart.restaurant_id().ok_or(CheckoutError::NoRestaurant)?;

    for line in cart.lines() {
        if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
            return Err(CheckoutError::InvalidQuantity(line.id));
        }
        if line.menu_item.restaurant_id != restaurant_id {
            return Err(CheckoutError::MixedRestaurants(line.id));
        }
    }

    let order_id = Uuid::new_v4();
    let order = CreateOrderEntity {
        id: order_id,
        restaurant_id,
        status: OrderStatus::Received,
        total: cart.total(),
        customer_name: Some(form.customer_name),
        customer_phone: form.customer_phone,
        table_number: form.table_number,
    };
    let items = cart
        .lines()
        .iter()
        .map(|line| CreateOrderItemEntity {
            id: Uuid::new_v4(),
            order_id,
            menu_item_id: line.menu_item.id,
            quantity: line.quantity,
            unit_price: line.menu_item.price,
            notes: line.notes.clone(),
        })
        .collect();

    let (order, order_items) = backend.place_order(order, items).await.map_err(|err| {
        warn!("Failed to place order from cart {}: {}", cart.key(), err);
        err
    })?;

    cart.clear_cart();
    info!(
        "Cart {} checked out as order {} ({} items)",
        cart.key(),
        order.id,
        order_items.len()
    );

    Ok(PlacedOrder {
        status_path: status_path(order.id),
        order,
        order_items,
    })
}
