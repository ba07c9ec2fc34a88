use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt, future, stream};
use tracing::{debug, warn};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    backend::Backend,
    feed::{
        ChangeEvent, OrderFilter, OrderListState, OrderState, Subscription,
        state::OrderWithItems,
    },
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_order))
        .routes(utoipa_axum::routes!(get_order_events))
        .routes(utoipa_axum::routes!(get_restaurant_orders))
        .routes(utoipa_axum::routes!(get_restaurant_order_events))
}

/// Fetch an order with its items.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<OrderWithItems, String>),
        (status = 404, description = "Unknown order")
    )
)]
async fn get_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.backend.order(id).await?;
    let order_items = state.backend.order_items(&[id]).await?;

    Ok(StdResponse {
        data: Some(OrderWithItems::new(order, order_items)),
        message: Some("Get order successfully"),
    })
}

/// Follow an order as it moves through the kitchen.
///
/// Sends a `snapshot` event first, then an `order` event with the merged state after
/// every change. The stream ends after the order has been deleted.
#[utoipa::path(
    get,
    path = "/orders/{id}/events",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Order ID to follow")
    ),
    responses(
        (status = 200, description = "Stream of order states", content_type = "text/event-stream", body = OrderState),
        (status = 404, description = "Unknown order")
    )
)]
async fn get_order_events(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    // Subscribe before reading so nothing between the read and the first change is lost.
    let subscription = state.changes.subscribe(OrderFilter::Order(id));

    let order = state.backend.order(id).await?;
    let order_items = state.backend.order_items(&[id]).await?;
    let order_state = OrderState::new(order, order_items);

    let snapshot = Event::default().event("snapshot").json_data(&order_state);

    let updates = stream::unfold(Some((subscription, order_state)), |feed| async move {
        let (mut subscription, mut order_state) = feed?;

        loop {
            let change = subscription.recv().await?;
            if !order_state.apply(change) {
                continue;
            }

            let event = Event::default().event("order").json_data(&order_state);
            let next = if order_state.is_deleted() {
                debug!("Order {} deleted, closing its feed", order_state.order_id);
                None
            } else {
                Some((subscription, order_state))
            };

            return Some((event, next));
        }
    });

    let events = stream::once(future::ready(snapshot)).chain(updates);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Fetch every order of a restaurant, newest first.
#[utoipa::path(
    get,
    path = "/restaurants/{id}/orders",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Restaurant ID")
    ),
    responses(
        (status = 200, description = "List restaurant orders", body = StdResponse<OrderListState, String>),
        (status = 404, description = "Unknown restaurant")
    )
)]
async fn get_restaurant_orders(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let orders = load_order_list(state.backend.as_ref(), id).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("List restaurant orders successfully"),
    })
}

/// Follow the order list of a restaurant.
///
/// Sends a `snapshot` event first, then an `orders` event with the merged list
/// after every change.
#[utoipa::path(
    get,
    path = "/restaurants/{id}/orders/events",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Restaurant ID")
    ),
    responses(
        (status = 200, description = "Stream of order lists", content_type = "text/event-stream", body = OrderListState),
        (status = 404, description = "Unknown restaurant")
    )
)]
async fn get_restaurant_order_events(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let subscription = state.changes.subscribe(OrderFilter::Restaurant(id));
    let list = load_order_list(state.backend.as_ref(), id).await?;

    let snapshot = Event::default().event("snapshot").json_data(&list);

    let backend = state.backend.clone();
    let updates = stream::unfold(
        (subscription, list, backend),
        |(mut subscription, mut list, backend): (Subscription, OrderListState, Arc<dyn Backend>)| async move {
            loop {
                let change = subscription.recv().await?;

                let items = match &change {
                    ChangeEvent::Inserted(order) => {
                        backend.order_items(&[order.id]).await.unwrap_or_else(|err| {
                            warn!("Failed to load items of new order {}: {}", order.id, err);
                            Vec::new()
                        })
                    }
                    _ => Vec::new(),
                };

                if list.apply(change, items) {
                    let event = Event::default().event("orders").json_data(&list);
                    return Some((event, (subscription, list, backend)));
                }
            }
        },
    );

    let events = stream::once(future::ready(snapshot)).chain(updates);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn load_order_list(
    backend: &dyn Backend,
    restaurant_id: Uuid,
) -> Result<OrderListState, AppError> {
    // 404 for unknown restaurants rather than an empty list.
    backend.restaurant(restaurant_id).await?;

    let orders = backend.restaurant_orders(restaurant_id).await?;
    let order_ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
    let order_items = backend.order_items(&order_ids).await?;

    Ok(OrderListState::new(orders, order_items))
}
