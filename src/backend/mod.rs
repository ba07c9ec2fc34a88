//! Table-scoped query interface over the hosted data store.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    infra::aliases::DieselError,
    models::{
        CategoryEntity, CreateOrderEntity, CreateOrderItemEntity, MenuItemEntity, OrderEntity,
        OrderItemEntity, RestaurantEntity,
    },
    status::OrderStatus,
};

pub use postgres::PgBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Record not found")]
    NotFound,

    #[error("Failed to obtain a DB connection: {0}")]
    Connection(String),

    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Referenced record no longer exists: {0}")]
    MissingReference(String),

    #[error("Query failed: {0}")]
    Query(DieselError),
}

impl From<DieselError> for BackendError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => BackendError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                BackendError::MissingReference(
                    info.constraint_name().unwrap_or(info.message()).to_string(),
                )
            }
            other => BackendError::Query(other),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn restaurant(&self, id: Uuid) -> BackendResult<RestaurantEntity>;

    async fn restaurant_by_slug(&self, slug: &str) -> BackendResult<RestaurantEntity>;

    /// Categories of a restaurant in display order.
    async fn categories(&self, restaurant_id: Uuid) -> BackendResult<Vec<CategoryEntity>>;

    /// Available menu items of a restaurant, by name.
    async fn menu_items(&self, restaurant_id: Uuid) -> BackendResult<Vec<MenuItemEntity>>;

    async fn menu_item(&self, id: Uuid) -> BackendResult<MenuItemEntity>;

    async fn order(&self, id: Uuid) -> BackendResult<OrderEntity>;

    /// Orders of a restaurant, newest first.
    async fn restaurant_orders(&self, restaurant_id: Uuid) -> BackendResult<Vec<OrderEntity>>;

    async fn order_items(&self, order_ids: &[Uuid]) -> BackendResult<Vec<OrderItemEntity>>;

    /// Writes an order and all of its items, or nothing at all. Items pointing at a
    /// menu item that no longer exists fail with [`BackendError::MissingReference`].
    async fn place_order(
        &self,
        order: CreateOrderEntity,
        items: Vec<CreateOrderItemEntity>,
    ) -> BackendResult<(OrderEntity, Vec<OrderItemEntity>)>;

    /// Moves an order to `status` if its current status can advance to it. The
    /// check and the write are atomic; anything else is
    /// [`BackendError::InvalidTransition`] and leaves the order untouched.
    async fn update_order_status(&self, id: Uuid, status: OrderStatus)
    -> BackendResult<OrderEntity>;

    async fn delete_order(&self, id: Uuid) -> BackendResult<OrderEntity>;
}
