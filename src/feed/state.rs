//! Locally held order state kept current by change events.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    currency::format_dzd,
    feed::OrderChange,
    models::{OrderEntity, OrderItemEntity},
};

/// One order as followed by its status view.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct OrderState {
    pub order_id: Uuid,
    /// `None` once the order has been deleted.
    pub order: Option<OrderEntity>,
    pub order_items: Vec<OrderItemEntity>,
    pub total_display: Option<String>,
}

impl OrderState {
    pub fn new(order: OrderEntity, order_items: Vec<OrderItemEntity>) -> Self {
        Self {
            order_id: order.id,
            total_display: Some(format_dzd(order.total)),
            order: Some(order),
            order_items,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.order.is_none()
    }

    /// Merges a change into the state. Returns whether anything changed.
    pub fn apply(&mut self, change: OrderChange) -> bool {
        if change.row().id != self.order_id {
            return false;
        }

        match change {
            OrderChange::Inserted(row) | OrderChange::Updated(row) => {
                if self.order.as_ref() == Some(&row) {
                    return false;
                }
                self.total_display = Some(format_dzd(row.total));
                self.order = Some(row);
            }
            OrderChange::Deleted(_) => {
                if self.order.is_none() {
                    return false;
                }
                self.order = None;
                self.order_items.clear();
                self.total_display = None;
            }
        }

        true
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct OrderWithItems {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
    pub total_display: String,
}

impl OrderWithItems {
    pub fn new(order: OrderEntity, order_items: Vec<OrderItemEntity>) -> Self {
        Self {
            total_display: format_dzd(order.total),
            order,
            order_items,
        }
    }
}

/// Orders of one restaurant, newest first.
#[derive(Serialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct OrderListState {
    pub orders: Vec<OrderWithItems>,
}

impl OrderListState {
    /// Groups `items` under their orders, keeping the order of `orders`.
    pub fn new(orders: Vec<OrderEntity>, mut items: Vec<OrderItemEntity>) -> Self {
        let orders = orders
            .into_iter()
            .map(|order| {
                let (mine, rest): (Vec<_>, Vec<_>) =
                    items.drain(..).partition(|item| item.order_id == order.id);
                items = rest;
                OrderWithItems::new(order, mine)
            })
            .collect();

        Self { orders }
    }

    pub fn get(&self, id: Uuid) -> Option<&OrderWithItems> {
        self.orders.iter().find(|entry| entry.order.id == id)
    }

    /// Inserts are prepended, updates replace in place, deletes filter out.
    /// `items` is only used for inserts. Returns whether anything changed.
    pub fn apply(&mut self, change: OrderChange, items: Vec<OrderItemEntity>) -> bool {
        match change {
            OrderChange::Inserted(row) => {
                if self.get(row.id).is_some() {
                    return false;
                }
                self.orders.insert(0, OrderWithItems::new(row, items));
                true
            }
            OrderChange::Updated(row) => {
                match self.orders.iter_mut().find(|entry| entry.order.id == row.id) {
                    Some(entry) if entry.order != row => {
                        entry.total_display = format_dzd(row.total);
                        entry.order = row;
                        true
                    }
                    _ => false,
                }
            }
            OrderChange::Deleted(row) => {
                let before = self.orders.len();
                self.orders.retain(|entry| entry.order.id != row.id);
                self.orders.len() != before
            }
        }
    }
}
