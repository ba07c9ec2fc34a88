use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    cart::{CartState, CartStore, MAX_LINE_QUANTITY},
    checkout::{self, CheckoutForm, PlacedOrder},
    currency::format_dzd,
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/carts",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart))
            .routes(utoipa_axum::routes!(clear_cart))
            .routes(utoipa_axum::routes!(add_item))
            .routes(utoipa_axum::routes!(update_item))
            .routes(utoipa_axum::routes!(remove_item))
            .routes(utoipa_axum::routes!(place_order)),
    )
}

#[derive(Serialize, ToSchema)]
struct CartRes {
    pub cart: CartState,
    pub total: i64,
    pub total_display: String,
}

impl From<&CartStore> for CartRes {
    fn from(cart: &CartStore) -> Self {
        let total = cart.total();
        Self {
            cart: cart.state().clone(),
            total,
            total_display: format_dzd(total),
        }
    }
}

/// Current content of a customer's cart.
#[utoipa::path(
    get,
    path = "/{session}",
    tags = ["Carts"],
    params(
        ("session" = String, Path, description = "Customer session identifier")
    ),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<CartRes, String>),
        (status = 400, description = "Malformed session identifier")
    )
)]
async fn get_cart(
    Path(session): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let cart = state.carts.open(&session).await?;

    Ok(StdResponse {
        data: Some(CartRes::from(&*cart)),
        message: Some("Get cart successfully"),
    })
}

/// Empty the cart. The restaurant it is bound to is kept.
#[utoipa::path(
    delete,
    path = "/{session}",
    tags = ["Carts"],
    params(
        ("session" = String, Path, description = "Customer session identifier")
    ),
    responses(
        (status = 200, description = "Cleared cart successfully", body = StdResponse<CartRes, String>)
    )
)]
async fn clear_cart(
    Path(session): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut cart = state.carts.open(&session).await?;
    cart.clear_cart();

    Ok(StdResponse {
        data: Some(CartRes::from(&*cart)),
        message: Some("Cleared cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AddItemReq {
    pub menu_item_id: Uuid,
    #[serde(default = "one")]
    pub quantity: i32,
    pub notes: Option<String>,
}

fn one() -> i32 {
    1
}

/// Add a menu item to the cart.
///
/// An item from another restaurant than the one the cart is bound to replaces the
/// cart's content.
#[utoipa::path(
    post,
    path = "/{session}/items",
    tags = ["Carts"],
    params(
        ("session" = String, Path, description = "Customer session identifier")
    ),
    request_body = AddItemReq,
    responses(
        (status = 200, description = "Added item successfully", body = StdResponse<CartRes, String>),
        (status = 400, description = "Quantity out of range"),
        (status = 404, description = "Unknown menu item"),
        (status = 409, description = "Menu item is not available")
    )
)]
async fn add_item(
    Path(session): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AddItemReq>,
) -> Result<impl IntoResponse, AppError> {
    check_quantity(body.quantity)?;

    let menu_item = state.backend.menu_item(body.menu_item_id).await?;
    if !menu_item.is_available {
        return Err(AppError::Conflict(format!(
            "{} is not available right now",
            menu_item.name
        )));
    }

    let mut cart = state.carts.open(&session).await?;
    let same_restaurant = cart.restaurant_id() == Some(menu_item.restaurant_id);

    if same_restaurant {
        let in_cart = cart
            .lines()
            .iter()
            .find(|line| line.menu_item.id == menu_item.id)
            .map_or(0, |line| line.quantity);
        check_quantity(in_cart.saturating_add(body.quantity))?;
    }

    // Looked up before the cart is touched; a failed lookup leaves it intact.
    let restaurant = if same_restaurant && cart.restaurant_slug().is_some() {
        None
    } else {
        Some(state.backend.restaurant(menu_item.restaurant_id).await?)
    };

    cart.add_item(menu_item, body.quantity, non_blank(body.notes));
    if let Some(restaurant) = restaurant {
        cart.set_restaurant_info(restaurant.id, restaurant.slug);
    }

    Ok(StdResponse {
        data: Some(CartRes::from(&*cart)),
        message: Some("Added item successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct UpdateItemReq {
    /// Zero or less removes the line. At most 999.
    pub quantity: Option<i32>,
    /// An empty note clears it.
    pub notes: Option<String>,
}

/// Change the quantity and/or note of a cart line.
#[utoipa::path(
    patch,
    path = "/{session}/items/{line_id}",
    tags = ["Carts"],
    params(
        ("session" = String, Path, description = "Customer session identifier"),
        ("line_id" = Uuid, Path, description = "Cart line to update")
    ),
    request_body = UpdateItemReq,
    responses(
        (status = 200, description = "Updated item successfully", body = StdResponse<CartRes, String>),
        (status = 400, description = "Quantity out of range"),
        (status = 404, description = "Unknown cart line")
    )
)]
async fn update_item(
    Path((session, line_id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
    Json(body): Json<UpdateItemReq>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(quantity) = body.quantity.filter(|quantity| *quantity > 0) {
        check_quantity(quantity)?;
    }

    let mut cart = state.carts.open(&session).await?;
    if cart.line(line_id).is_none() {
        return Err(AppError::NotFound);
    }

    if let Some(notes) = body.notes {
        cart.update_item_notes(line_id, non_blank(Some(notes)));
    }

    match body.quantity {
        Some(quantity) if quantity <= 0 => {
            debug!("Removing line {} from cart {}", line_id, cart.key());
            cart.remove_item(line_id);
        }
        Some(quantity) => cart.update_item_quantity(line_id, quantity),
        None => {}
    }

    Ok(StdResponse {
        data: Some(CartRes::from(&*cart)),
        message: Some("Updated item successfully"),
    })
}

/// Remove a line from the cart.
#[utoipa::path(
    delete,
    path = "/{session}/items/{line_id}",
    tags = ["Carts"],
    params(
        ("session" = String, Path, description = "Customer session identifier"),
        ("line_id" = Uuid, Path, description = "Cart line to remove")
    ),
    responses(
        (status = 200, description = "Removed item successfully", body = StdResponse<CartRes, String>),
        (status = 404, description = "Unknown cart line")
    )
)]
async fn remove_item(
    Path((session, line_id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut cart = state.carts.open(&session).await?;
    if cart.line(line_id).is_none() {
        return Err(AppError::NotFound);
    }

    cart.remove_item(line_id);

    Ok(StdResponse {
        data: Some(CartRes::from(&*cart)),
        message: Some("Removed item successfully"),
    })
}

/// Place the cart as an order. The cart is emptied once the order is stored.
#[utoipa::path(
    post,
    path = "/{session}/checkout",
    tags = ["Carts"],
    params(
        ("session" = String, Path, description = "Customer session identifier")
    ),
    request_body = CheckoutForm,
    responses(
        (status = 201, description = "Placed order successfully", body = StdResponse<PlacedOrder, String>),
        (status = 400, description = "Cart or customer details cannot be ordered"),
        (status = 409, description = "An item in the cart is no longer on the menu")
    )
)]
async fn place_order(
    Path(session): Path<String>,
    State(state): State<AppState>,
    Json(form): Json<CheckoutForm>,
) -> Result<impl IntoResponse, AppError> {
    let mut cart = state.carts.open(&session).await?;
    let placed = checkout::submit_order(state.backend.as_ref(), &mut cart, form).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, placed.status_path.clone())],
        StdResponse {
            data: Some(placed),
            message: Some("Placed order successfully"),
        },
    ))
}

fn check_quantity(quantity: i32) -> Result<(), AppError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )))
    }
}

fn non_blank(notes: Option<String>) -> Option<String> {
    notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode, header};
    use serde_json::{Value, json};

    use crate::{
        models::{CategoryEntity, RestaurantEntity},
        routes::testing::{TestApp, app, send},
    };

    fn restaurant(app: &TestApp, slug: &str) -> (RestaurantEntity, CategoryEntity) {
        let restaurant = app.backend.add_restaurant(slug, slug);
        let category = app.backend.add_category(restaurant.id, "Mains", 1);
        (restaurant, category)
    }

    async fn add(app: &TestApp, session: &str, body: Value) -> (StatusCode, Value) {
        let uri = format!("/carts/{session}/items");
        let (status, _, body) = send(&app.router, Method::POST, &uri, Some(body)).await;
        (status, body)
    }

    #[tokio::test]
    async fn adding_the_same_item_sums_quantities() {
        let app = app();
        let (restaurant, mains) = restaurant(&app, "le-grill");
        let burger = app.backend.add_menu_item(&mains, "Burger", 500);

        add(&app, "table-3", json!({ "menu_item_id": burger.id, "quantity": 2 })).await;
        let (status, body) = add(&app, "table-3", json!({ "menu_item_id": burger.id })).await;

        assert_eq!(status, StatusCode::OK);
        let cart = &body["data"]["cart"];
        assert_eq!(cart["items"].as_array().unwrap().len(), 1);
        assert_eq!(cart["items"][0]["quantity"], 3);
        assert_eq!(cart["restaurantId"], restaurant.id.to_string());
        assert_eq!(cart["restaurantSlug"], "le-grill");
        assert_eq!(body["data"]["total"], 1500);
        assert_eq!(body["data"]["total_display"], "1 500 DZD");
    }

    #[tokio::test]
    async fn item_from_another_restaurant_replaces_the_cart() {
        let app = app();
        let (_, first) = restaurant(&app, "first");
        let (second, other) = restaurant(&app, "second");
        let pizza = app.backend.add_menu_item(&first, "Pizza", 900);
        let tacos = app.backend.add_menu_item(&other, "Tacos", 700);

        add(&app, "s1", json!({ "menu_item_id": pizza.id })).await;
        let (_, body) = add(&app, "s1", json!({ "menu_item_id": tacos.id })).await;

        let cart = &body["data"]["cart"];
        assert_eq!(cart["items"].as_array().unwrap().len(), 1);
        assert_eq!(cart["items"][0]["menuItem"]["name"], "Tacos");
        assert_eq!(cart["restaurantId"], second.id.to_string());
        assert_eq!(cart["restaurantSlug"], "second");
    }

    #[tokio::test]
    async fn rejects_bad_additions() {
        let app = app();
        let (_, mains) = restaurant(&app, "le-grill");
        let soup = app.backend.add_menu_item(&mains, "Chorba", 400);
        app.backend.set_available(soup.id, false);

        let (status, _) = add(&app, "s1", json!({ "menu_item_id": soup.id })).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = add(&app, "s1", json!({ "menu_item_id": soup.id, "quantity": 0 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = add(&app, "s1", json!({ "menu_item_id": uuid::Uuid::new_v4() })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let bourek = app.backend.add_menu_item(&mains, "Bourek", 250);
        let (status, _) = add(&app, "not%20valid", json!({ "menu_item_id": bourek.id })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn quantities_above_the_line_cap_are_rejected() {
        let app = app();
        let (_, mains) = restaurant(&app, "le-grill");
        let burger = app.backend.add_menu_item(&mains, "Burger", 500);

        let huge = json!({ "menu_item_id": burger.id, "quantity": 2_000_000_000 });
        let (status, body) = add(&app, "s1", huge.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Quantity must be between 1 and 999");
        let (status, _) = add(&app, "s1", huge).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = add(&app, "s1", json!({ "menu_item_id": burger.id, "quantity": 998 })).await;
        let line = body["data"]["cart"]["items"][0]["id"].as_str().unwrap().to_string();
        let (status, _) = add(&app, "s1", json!({ "menu_item_id": burger.id, "quantity": 2 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/carts/s1/items/{line}");
        let (status, _, _) =
            send(&app.router, Method::PATCH, &uri, Some(json!({ "quantity": i32::MAX }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, _, body) = send(&app.router, Method::GET, "/carts/s1", None).await;
        assert_eq!(body["data"]["cart"]["items"][0]["quantity"], 998);
        assert_eq!(body["data"]["total"], 499_000);
    }

    #[tokio::test]
    async fn failed_restaurant_lookup_leaves_the_cart_alone() {
        let app = app();
        let (first, mains) = restaurant(&app, "first");
        let pizza = app.backend.add_menu_item(&mains, "Pizza", 900);
        add(&app, "s1", json!({ "menu_item_id": pizza.id, "quantity": 3 })).await;

        let orphan = CategoryEntity {
            id: uuid::Uuid::new_v4(),
            restaurant_id: uuid::Uuid::new_v4(),
            name: "Mains".into(),
            position: 1,
            created_at: chrono::Utc::now(),
        };
        let ghost = app.backend.add_menu_item(&orphan, "Ghost", 300);

        let (status, _) = add(&app, "s1", json!({ "menu_item_id": ghost.id })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _, body) = send(&app.router, Method::GET, "/carts/s1", None).await;
        let cart = &body["data"]["cart"];
        assert_eq!(cart["items"].as_array().unwrap().len(), 1);
        assert_eq!(cart["items"][0]["menuItem"]["name"], "Pizza");
        assert_eq!(cart["items"][0]["quantity"], 3);
        assert_eq!(cart["restaurantId"], first.id.to_string());
        assert_eq!(cart["restaurantSlug"], "first");
    }

    #[tokio::test]
    async fn updates_and_removes_lines() {
        let app = app();
        let (_, mains) = restaurant(&app, "le-grill");
        let burger = app.backend.add_menu_item(&mains, "Burger", 500);
        let fries = app.backend.add_menu_item(&mains, "Fries", 250);

        add(&app, "s1", json!({ "menu_item_id": burger.id })).await;
        let (_, body) = add(&app, "s1", json!({ "menu_item_id": fries.id })).await;
        let burger_line = body["data"]["cart"]["items"][0]["id"].as_str().unwrap().to_string();
        let fries_line = body["data"]["cart"]["items"][1]["id"].as_str().unwrap().to_string();

        let uri = format!("/carts/s1/items/{burger_line}");
        let (status, _, body) = send(
            &app.router,
            Method::PATCH,
            &uri,
            Some(json!({ "quantity": 4, "notes": "well done" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["cart"]["items"][0]["quantity"], 4);
        assert_eq!(body["data"]["cart"]["items"][0]["notes"], "well done");
        assert_eq!(body["data"]["total"], 2250);

        let uri = format!("/carts/s1/items/{fries_line}");
        let (_, _, body) =
            send(&app.router, Method::PATCH, &uri, Some(json!({ "quantity": 0 }))).await;
        assert_eq!(body["data"]["cart"]["items"].as_array().unwrap().len(), 1);

        let uri = format!("/carts/s1/items/{burger_line}");
        let (status, _, body) = send(&app.router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 0);

        let (status, _, _) = send(&app.router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clearing_keeps_the_restaurant() {
        let app = app();
        let (restaurant, mains) = restaurant(&app, "le-grill");
        let burger = app.backend.add_menu_item(&mains, "Burger", 500);
        add(&app, "s1", json!({ "menu_item_id": burger.id })).await;

        let (status, _, body) = send(&app.router, Method::DELETE, "/carts/s1", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["cart"]["items"].as_array().unwrap().is_empty());
        assert_eq!(body["data"]["cart"]["restaurantId"], restaurant.id.to_string());
    }

    #[tokio::test]
    async fn checkout_places_the_order_and_empties_the_cart() {
        let app = app();
        let (restaurant, mains) = restaurant(&app, "le-grill");
        let pizza = app.backend.add_menu_item(&mains, "Pizza", 1100);
        let cola = app.backend.add_menu_item(&mains, "Cola", 600);
        add(&app, "s1", json!({ "menu_item_id": pizza.id })).await;
        add(&app, "s1", json!({ "menu_item_id": cola.id, "quantity": 2 })).await;

        let (status, headers, body) = send(
            &app.router,
            Method::POST,
            "/carts/s1/checkout",
            Some(json!({ "customer_name": "Amine", "table_number": "4" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let order = &body["data"]["order"];
        assert_eq!(order["total"], 2300);
        assert_eq!(order["status"], "received");
        assert_eq!(order["restaurant_id"], restaurant.id.to_string());
        assert_eq!(body["data"]["order_items"].as_array().unwrap().len(), 2);
        let location = format!("/orders/{}", order["id"].as_str().unwrap());
        assert_eq!(headers[header::LOCATION], location.as_str());

        let (_, _, body) = send(&app.router, Method::GET, "/carts/s1", None).await;
        assert!(body["data"]["cart"]["items"].as_array().unwrap().is_empty());
        assert_eq!(body["data"]["total"], 0);
    }

    #[tokio::test]
    async fn checkout_with_a_deleted_menu_item_is_a_conflict() {
        let app = app();
        let (_, mains) = restaurant(&app, "le-grill");
        let pizza = app.backend.add_menu_item(&mains, "Pizza", 1100);
        add(&app, "s1", json!({ "menu_item_id": pizza.id, "quantity": 2 })).await;
        app.backend.remove_menu_item(pizza.id);

        let (status, _, body) = send(
            &app.router,
            Method::POST,
            "/carts/s1/checkout",
            Some(json!({ "customer_name": "Amine" })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "An item in the cart is no longer on the menu");
        assert_eq!(app.backend.order_count(), 0);

        let (_, _, body) = send(&app.router, Method::GET, "/carts/s1", None).await;
        assert_eq!(body["data"]["cart"]["items"][0]["quantity"], 2);
    }

    #[tokio::test]
    async fn checkout_of_an_empty_cart_is_rejected() {
        let app = app();

        let (status, _, body) = send(
            &app.router,
            Method::POST,
            "/carts/s1/checkout",
            Some(json!({ "customer_name": "Amine" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cart is empty");
        assert_eq!(app.backend.order_count(), 0);
    }
}
