use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use qrmenu_orders::{
    backend::PgBackend,
    cart::{CartSessions, FileStorage},
    feed::{ChangeHub, OrderChangeListener},
    infra::{app_state::AppState, bootstrap, config, db, swagger},
    routes,
};
use tower_http::trace::TraceLayer;

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = bootstrap::init_env();
    bootstrap::init_tracing();
    match env_file {
        Ok(path) => tracing::info!("Loaded environment from {}", path.display()),
        Err(err) => tracing::warn!("No .env file loaded: {}", err),
    }

    let (routes, mut openapi) = routes::routes_with_openapi().split_for_parts();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("QR Menu Orders API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi);

    tracing::info!("Running migrations...");
    let config = config::load()?;
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    tracing::info!("Bootstrapping...");
    let db_pool = db::create_pool(&config.database).await?;

    let changes = ChangeHub::new(config.feed.capacity);
    let _listener = OrderChangeListener::new(config.database.url.clone())
        .start(changes.clone())
        .await?;

    let storage = FileStorage::new(&config.carts.storage_dir).with_context(|| {
        format!(
            "Failed to open cart storage at {}",
            config.carts.storage_dir.display()
        )
    })?;

    let state = AppState::new(
        Arc::new(PgBackend::new(db_pool)),
        CartSessions::new(Arc::new(storage)),
        changes,
    );

    let app = Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    bootstrap::serve("QR Menu Orders", app, &config.server).await
}
