use utoipa_axum::router::OpenApiRouter;

use crate::infra::app_state::AppState;

pub mod carts;
pub mod menu;
pub mod orders;
pub mod staff;

/// Every public route of the service, with its OpenAPI description.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    menu::routes_with_openapi()
        .merge(carts::routes_with_openapi())
        .merge(orders::routes_with_openapi())
        .merge(staff::routes_with_openapi())
}
