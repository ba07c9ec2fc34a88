use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::status::OrderStatus;

// Menus

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(table_name = crate::schema::restaurants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RestaurantEntity {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(belongs_to(RestaurantEntity, foreign_key = restaurant_id))]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CategoryEntity {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A menu item row. Carts keep a copy of this as it was when the item was added.
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(belongs_to(CategoryEntity, foreign_key = category_id))]
#[diesel(table_name = crate::schema::menu_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MenuItemEntity {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: i64,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub status: OrderStatus,
    pub total: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub table_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub status: OrderStatus,
    pub total: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub table_number: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(belongs_to(OrderEntity, foreign_key = order_id))]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    /// Price of one unit when the order was placed, independent of later menu edits.
    pub unit_price: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderItemEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub notes: Option<String>,
}

impl CreateOrderEntity {
    /// Row as the backend would return it, stamped with `created_at`.
    pub fn into_entity(self, created_at: DateTime<Utc>) -> OrderEntity {
        OrderEntity {
            id: self.id,
            restaurant_id: self.restaurant_id,
            status: self.status,
            total: self.total,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            table_number: self.table_number,
            created_at,
        }
    }
}

impl CreateOrderItemEntity {
    pub fn into_entity(self, created_at: DateTime<Utc>) -> OrderItemEntity {
        OrderItemEntity {
            id: self.id,
            order_id: self.order_id,
            menu_item_id: self.menu_item_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            notes: self.notes,
            created_at,
        }
    }
}
