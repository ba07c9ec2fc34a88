use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    models::OrderEntity,
    status::OrderStatus,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/staff/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(update_order_status))
            .routes(utoipa_axum::routes!(delete_order)),
    )
}

#[derive(Deserialize, ToSchema)]
struct UpdateOrderStatusReq {
    pub status: OrderStatus,
}

/// Move an order forward in the kitchen workflow.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Staff"],
    params(
        ("id" = Uuid, Path, description = "Order ID to update")
    ),
    request_body = UpdateOrderStatusReq,
    responses(
        (status = 200, description = "Updated order status successfully", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "Unknown order"),
        (status = 409, description = "Transition goes backwards or stays in place")
    )
)]
async fn update_order_status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<UpdateOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.backend.update_order_status(id, body.status).await?;
    info!("Order {} moved to {}", id, order.status);

    Ok(StdResponse {
        data: Some(order),
        message: Some("Updated order status successfully"),
    })
}

/// Remove an order.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Staff"],
    params(
        ("id" = Uuid, Path, description = "Order ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted order successfully", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "Unknown order")
    )
)]
async fn delete_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.backend.delete_order(id).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Deleted order successfully"),
    })
}
