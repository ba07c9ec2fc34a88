use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    currency::format_dzd,
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    models::{CategoryEntity, MenuItemEntity, RestaurantEntity},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/menu",
        OpenApiRouter::new().routes(utoipa_axum::routes!(get_menu)),
    )
}

#[derive(Serialize, ToSchema)]
struct MenuItemView {
    pub item: MenuItemEntity,
    pub price_display: String,
}

#[derive(Serialize, ToSchema)]
struct MenuCategoryView {
    pub category: CategoryEntity,
    pub items: Vec<MenuItemView>,
}

#[derive(Serialize, ToSchema)]
struct GetMenuRes {
    pub restaurant: RestaurantEntity,
    pub categories: Vec<MenuCategoryView>,
}

/// Public menu of a restaurant: its categories in display order with the items
/// currently available. Categories without available items are left out.
#[utoipa::path(
    get,
    path = "/{slug}",
    tags = ["Menu"],
    params(
        ("slug" = String, Path, description = "Restaurant slug printed in the QR code")
    ),
    responses(
        (status = 200, description = "Get menu successfully", body = StdResponse<GetMenuRes, String>),
        (status = 404, description = "Unknown restaurant")
    )
)]
async fn get_menu(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let restaurant = state.backend.restaurant_by_slug(&slug).await?;
    let categories = state.backend.categories(restaurant.id).await?;
    let mut items = state.backend.menu_items(restaurant.id).await?;

    let categories = categories
        .into_iter()
        .filter_map(|category| {
            let (mine, rest): (Vec<_>, Vec<_>) = items
                .drain(..)
                .partition(|item| item.category_id == category.id);
            items = rest;

            if mine.is_empty() {
                return None;
            }

            let items = mine
                .into_iter()
                .map(|item| MenuItemView {
                    price_display: format_dzd(item.price),
                    item,
                })
                .collect();

            Some(MenuCategoryView { category, items })
        })
        .collect();

    Ok(StdResponse {
        data: Some(GetMenuRes {
            restaurant,
            categories,
        }),
        message: Some("Get menu successfully"),
    })
}
