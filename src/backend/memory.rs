//! In-process [`Backend`] for tests. Writes are echoed to a [`ChangeHub`] the way
//! the `orders` trigger does in the database.

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    backend::{Backend, BackendError, BackendResult},
    feed::{ChangeEvent, ChangeHub},
    models::{
        CategoryEntity, CreateOrderEntity, CreateOrderItemEntity, MenuItemEntity, OrderEntity,
        OrderItemEntity, RestaurantEntity,
    },
    status::OrderStatus,
};

#[derive(Debug, Default)]
struct Tables {
    restaurants: Vec<RestaurantEntity>,
    categories: Vec<CategoryEntity>,
    menu_items: Vec<MenuItemEntity>,
    orders: Vec<OrderEntity>,
    order_items: Vec<OrderItemEntity>,
    removed_menu_items: HashSet<Uuid>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    changes: ChangeHub,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new(changes: ChangeHub) -> Self {
        Self {
            tables: Mutex::default(),
            changes,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every following `place_order` fail without writing anything.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn add_restaurant(&self, name: &str, slug: &str) -> RestaurantEntity {
        let restaurant = RestaurantEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Utc::now(),
        };
        self.tables().restaurants.push(restaurant.clone());
        restaurant
    }

    pub fn add_category(&self, restaurant_id: Uuid, name: &str, position: i32) -> CategoryEntity {
        let category = CategoryEntity {
            id: Uuid::new_v4(),
            restaurant_id,
            name: name.to_string(),
            position,
            created_at: Utc::now(),
        };
        self.tables().categories.push(category.clone());
        category
    }

    pub fn add_menu_item(&self, category: &CategoryEntity, name: &str, price: i64) -> MenuItemEntity {
        let item = MenuItemEntity {
            id: Uuid::new_v4(),
            restaurant_id: category.restaurant_id,
            category_id: category.id,
            name: name.to_string(),
            description: None,
            image_url: None,
            price,
            is_available: true,
            created_at: Utc::now(),
        };
        self.tables().menu_items.push(item.clone());
        item
    }

    pub fn set_available(&self, menu_item_id: Uuid, available: bool) {
        if let Some(item) = self
            .tables()
            .menu_items
            .iter_mut()
            .find(|item| item.id == menu_item_id)
        {
            item.is_available = available;
        }
    }

    /// Deletes a menu item. Orders still referencing it fail like a foreign key would.
    pub fn remove_menu_item(&self, menu_item_id: Uuid) {
        let mut tables = self.tables();
        tables.menu_items.retain(|item| item.id != menu_item_id);
        tables.removed_menu_items.insert(menu_item_id);
    }

    pub fn order_count(&self) -> usize {
        self.tables().orders.len()
    }

    pub fn order_item_count(&self) -> usize {
        self.tables().order_items.len()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn restaurant(&self, id: Uuid) -> BackendResult<RestaurantEntity> {
        self.tables()
            .restaurants
            .iter()
            .find(|restaurant| restaurant.id == id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn restaurant_by_slug(&self, slug: &str) -> BackendResult<RestaurantEntity> {
        self.tables()
            .restaurants
            .iter()
            .find(|restaurant| restaurant.slug == slug)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn categories(&self, restaurant_id: Uuid) -> BackendResult<Vec<CategoryEntity>> {
        let mut categories: Vec<_> = self
            .tables()
            .categories
            .iter()
            .filter(|category| category.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| (a.position, &a.name).cmp(&(b.position, &b.name)));
        Ok(categories)
    }

    async fn menu_items(&self, restaurant_id: Uuid) -> BackendResult<Vec<MenuItemEntity>> {
        let mut items: Vec<_> = self
            .tables()
            .menu_items
            .iter()
            .filter(|item| item.restaurant_id == restaurant_id && item.is_available)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn menu_item(&self, id: Uuid) -> BackendResult<MenuItemEntity> {
        self.tables()
            .menu_items
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn order(&self, id: Uuid) -> BackendResult<OrderEntity> {
        self.tables()
            .orders
            .iter()
            .find(|order| order.id == id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn restaurant_orders(&self, restaurant_id: Uuid) -> BackendResult<Vec<OrderEntity>> {
        let mut orders: Vec<_> = self
            .tables()
            .orders
            .iter()
            .filter(|order| order.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_items(&self, order_ids: &[Uuid]) -> BackendResult<Vec<OrderItemEntity>> {
        Ok(self
            .tables()
            .order_items
            .iter()
            .filter(|item| order_ids.contains(&item.order_id))
            .cloned()
            .collect())
    }

    async fn place_order(
        &self,
        order: CreateOrderEntity,
        items: Vec<CreateOrderItemEntity>,
    ) -> BackendResult<(OrderEntity, Vec<OrderItemEntity>)> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("database unavailable".into()));
        }

        let now = Utc::now();
        let order = order.into_entity(now);
        let items: Vec<_> = items.into_iter().map(|item| item.into_entity(now)).collect();

        {
            let mut tables = self.tables();
            if let Some(item) = items
                .iter()
                .find(|item| tables.removed_menu_items.contains(&item.menu_item_id))
            {
                return Err(BackendError::MissingReference(format!(
                    "menu item {}",
                    item.menu_item_id
                )));
            }
            tables.orders.push(order.clone());
            tables.order_items.extend(items.iter().cloned());
        }

        self.changes.publish(ChangeEvent::Inserted(order.clone()));
        Ok((order, items))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> BackendResult<OrderEntity> {
        let order = {
            let mut tables = self.tables();
            let order = tables
                .orders
                .iter_mut()
                .find(|order| order.id == id)
                .ok_or(BackendError::NotFound)?;
            if !order.status.can_advance_to(status) {
                return Err(BackendError::InvalidTransition {
                    from: order.status,
                    to: status,
                });
            }
            order.status = status;
            order.clone()
        };

        self.changes.publish(ChangeEvent::Updated(order.clone()));
        Ok(order)
    }

    async fn delete_order(&self, id: Uuid) -> BackendResult<OrderEntity> {
        let order = {
            let mut tables = self.tables();
            let position = tables
                .orders
                .iter()
                .position(|order| order.id == id)
                .ok_or(BackendError::NotFound)?;
            tables.order_items.retain(|item| item.order_id != id);
            tables.orders.remove(position)
        };

        self.changes.publish(ChangeEvent::Deleted(order.clone()));
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn received_order(backend: &MemoryBackend) -> Uuid {
        let (order, _) = backend
            .place_order(
                CreateOrderEntity {
                    id: Uuid::new_v4(),
                    restaurant_id: Uuid::new_v4(),
                    status: OrderStatus::Received,
                    total: 500,
                    customer_name: Some("Yacine".into()),
                    customer_phone: None,
                    table_number: None,
                },
                Vec::new(),
            )
            .await
            .unwrap();
        order.id
    }

    #[tokio::test]
    async fn status_never_moves_backwards() {
        let backend = MemoryBackend::new(ChangeHub::new(8));
        let id = received_order(&backend).await;

        backend.update_order_status(id, OrderStatus::Ready).await.unwrap();
        let err = backend
            .update_order_status(id, OrderStatus::Preparing)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BackendError::InvalidTransition {
                from: OrderStatus::Ready,
                to: OrderStatus::Preparing
            }
        ));
        assert_eq!(backend.order(id).await.unwrap().status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn concurrent_updates_end_on_the_furthest_status() {
        for _ in 0..32 {
            let backend = Arc::new(MemoryBackend::new(ChangeHub::new(8)));
            let id = received_order(&backend).await;

            let ready = tokio::spawn({
                let backend = backend.clone();
                async move { backend.update_order_status(id, OrderStatus::Ready).await }
            });
            let preparing = tokio::spawn({
                let backend = backend.clone();
                async move { backend.update_order_status(id, OrderStatus::Preparing).await }
            });

            assert!(ready.await.unwrap().is_ok());
            let _ = preparing.await.unwrap();
            assert_eq!(backend.order(id).await.unwrap().status, OrderStatus::Ready);
        }
    }
}
