use async_trait::async_trait;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{
    AsyncConnection, AsyncPgConnection, RunQueryDsl, pooled_connection::bb8::PooledConnection,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    backend::{Backend, BackendError, BackendResult},
    infra::{aliases::DieselError, db::DbPool},
    models::{
        CategoryEntity, CreateOrderEntity, CreateOrderItemEntity, MenuItemEntity, OrderEntity,
        OrderItemEntity, RestaurantEntity,
    },
    schema::{categories, menu_items, order_items, orders, restaurants},
    status::OrderStatus,
};

/// [`Backend`] over the service's own PostgreSQL database.
#[derive(Clone)]
pub struct PgBackend {
    db_pool: DbPool,
}

impl PgBackend {
    pub fn new(db_pool: DbPool) -> Self {
        Self { db_pool }
    }

    async fn connection(&self) -> BackendResult<PooledConnection<'_, AsyncPgConnection>> {
        self.db_pool
            .get()
            .await
            .map_err(|err| BackendError::Connection(err.to_string()))
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn restaurant(&self, id: Uuid) -> BackendResult<RestaurantEntity> {
        let conn = &mut self.connection().await?;

        let restaurant = restaurants::table
            .find(id)
            .select(RestaurantEntity::as_select())
            .get_result(conn)
            .await?;

        Ok(restaurant)
    }

    async fn restaurant_by_slug(&self, slug: &str) -> BackendResult<RestaurantEntity> {
        let conn = &mut self.connection().await?;

        let restaurant = restaurants::table
            .filter(restaurants::slug.eq(slug))
            .select(RestaurantEntity::as_select())
            .get_result(conn)
            .await?;

        Ok(restaurant)
    }

    async fn categories(&self, restaurant_id: Uuid) -> BackendResult<Vec<CategoryEntity>> {
        let conn = &mut self.connection().await?;

        let categories = categories::table
            .filter(categories::restaurant_id.eq(restaurant_id))
            .order_by((categories::position.asc(), categories::name.asc()))
            .select(CategoryEntity::as_select())
            .get_results(conn)
            .await?;

        Ok(categories)
    }

    async fn menu_items(&self, restaurant_id: Uuid) -> BackendResult<Vec<MenuItemEntity>> {
        let conn = &mut self.connection().await?;

        let items = menu_items::table
            .filter(menu_items::restaurant_id.eq(restaurant_id))
            .filter(menu_items::is_available.eq(true))
            .order_by(menu_items::name.asc())
            .select(MenuItemEntity::as_select())
            .get_results(conn)
            .await?;

        Ok(items)
    }

    async fn menu_item(&self, id: Uuid) -> BackendResult<MenuItemEntity> {
        let conn = &mut self.connection().await?;

        let item = menu_items::table
            .find(id)
            .select(MenuItemEntity::as_select())
            .get_result(conn)
            .await?;

        Ok(item)
    }

    async fn order(&self, id: Uuid) -> BackendResult<OrderEntity> {
        let conn = &mut self.connection().await?;

        let order = orders::table
            .find(id)
            .select(OrderEntity::as_select())
            .get_result(conn)
            .await?;

        Ok(order)
    }

    async fn restaurant_orders(&self, restaurant_id: Uuid) -> BackendResult<Vec<OrderEntity>> {
        let conn = &mut self.connection().await?;

        let orders = orders::table
            .filter(orders::restaurant_id.eq(restaurant_id))
            .order_by(orders::created_at.desc())
            .select(OrderEntity::as_select())
            .get_results(conn)
            .await?;

        Ok(orders)
    }

    async fn order_items(&self, order_ids: &[Uuid]) -> BackendResult<Vec<OrderItemEntity>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = &mut self.connection().await?;

        let items = order_items::table
            .filter(order_items::order_id.eq_any(order_ids.to_vec()))
            .order_by(order_items::created_at.asc())
            .select(OrderItemEntity::as_select())
            .get_results(conn)
            .await?;

        Ok(items)
    }

    async fn place_order(
        &self,
        order: CreateOrderEntity,
        items: Vec<CreateOrderItemEntity>,
    ) -> BackendResult<(OrderEntity, Vec<OrderItemEntity>)> {
        let conn = &mut self.connection().await?;

        let (order, items) = conn
            .transaction(move |tx| {
                Box::pin(async move {
                    let order: OrderEntity = diesel::insert_into(orders::table)
                        .values(order)
                        .returning(OrderEntity::as_returning())
                        .get_result(tx)
                        .await?;

                    let items: Vec<OrderItemEntity> = if items.is_empty() {
                        Vec::new()
                    } else {
                        diesel::insert_into(order_items::table)
                            .values(items)
                            .returning(OrderItemEntity::as_returning())
                            .get_results(tx)
                            .await?
                    };

                    Ok::<(OrderEntity, Vec<OrderItemEntity>), DieselError>((order, items))
                })
            })
            .await?;

        info!(
            "Order {} placed for restaurant {} with {} items",
            order.id,
            order.restaurant_id,
            items.len()
        );

        Ok((order, items))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> BackendResult<OrderEntity> {
        let conn = &mut self.connection().await?;

        let order = conn
            .transaction(move |tx| {
                Box::pin(async move {
                    let current: OrderStatus = orders::table
                        .find(id)
                        .select(orders::status)
                        .for_update()
                        .get_result(tx)
                        .await?;

                    if !current.can_advance_to(status) {
                        return Err(BackendError::InvalidTransition {
                            from: current,
                            to: status,
                        });
                    }

                    let order = diesel::update(orders::table.find(id))
                        .set(orders::status.eq(status))
                        .returning(OrderEntity::as_returning())
                        .get_result(tx)
                        .await?;

                    Ok::<OrderEntity, BackendError>(order)
                })
            })
            .await?;

        debug!("Order {} is now {}", id, status);

        Ok(order)
    }

    async fn delete_order(&self, id: Uuid) -> BackendResult<OrderEntity> {
        let conn = &mut self.connection().await?;

        let order = diesel::delete(orders::table.find(id))
            .returning(OrderEntity::as_returning())
            .get_result(conn)
            .await?;

        info!("Order {} deleted", id);

        Ok(order)
    }
}
