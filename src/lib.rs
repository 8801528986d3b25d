pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::domain::errors::DomainError;
use crate::handlers::{cart, orders, products, reviews};

pub use config::{AppConfig, ConfigError};
pub use db::{create_pool, DbPool};
pub use handlers::AppState;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), DomainError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| DomainError::Internal(format!("migrations failed: {e}")))?;
    log::info!("applied {} pending migrations", applied.len());
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::create_order,
        orders::get_order,
        orders::list_orders,
        orders::cancel_order,
        orders::mark_paid,
        orders::mark_processing,
        orders::mark_shipped,
        orders::mark_delivered,
        orders::batch_transition,
        products::list_products,
        products::featured_products,
        products::new_products,
        products::similar_products,
        products::get_product,
        products::list_categories,
        reviews::submit_review,
        reviews::approve_reviews,
        reviews::verify_reviews,
        reviews::mark_helpful,
        reviews::unmark_helpful,
    ),
    tags(
        (name = "cart", description = "Shopping cart of a user or anonymous session"),
        (name = "orders", description = "Checkout and order fulfillment"),
        (name = "catalog", description = "Product browsing"),
        (name = "reviews", description = "Product reviews and moderation"),
    )
)]
pub struct ApiDoc;

/// Register every API route. Shared by the server and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/cart")
            .route("", web::get().to(cart::get_cart))
            .route("/items", web::post().to(cart::add_item))
            .route("/items/{id}", web::patch().to(cart::update_item))
            .route("/items/{id}", web::delete().to(cart::remove_item))
            .route("/clear", web::post().to(cart::clear_cart)),
    )
    .service(
        web::scope("/orders")
            .route("", web::post().to(orders::create_order))
            .route("", web::get().to(orders::list_orders))
            .route("/batch", web::post().to(orders::batch_transition))
            .route("/{id}", web::get().to(orders::get_order))
            .route("/{id}/cancel", web::post().to(orders::cancel_order))
            .route("/{id}/paid", web::post().to(orders::mark_paid))
            .route("/{id}/processing", web::post().to(orders::mark_processing))
            .route("/{id}/shipped", web::post().to(orders::mark_shipped))
            .route("/{id}/delivered", web::post().to(orders::mark_delivered)),
    )
    .service(
        web::scope("/products")
            .route("", web::get().to(products::list_products))
            .route("/featured", web::get().to(products::featured_products))
            .route("/new", web::get().to(products::new_products))
            .route("/{id}/reviews", web::post().to(reviews::submit_review))
            .route("/{slug}/similar", web::get().to(products::similar_products))
            .route("/{slug}", web::get().to(products::get_product)),
    )
    .route("/categories", web::get().to(products::list_categories))
    .service(
        web::scope("/reviews")
            .route("/approve", web::post().to(reviews::approve_reviews))
            .route("/verify", web::post().to(reviews::verify_reviews))
            .route("/{id}/helpful", web::post().to(reviews::mark_helpful))
            .route("/{id}/helpful", web::delete().to(reviews::unmark_helpful)),
    );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    state: web::Data<AppState>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let openapi = ApiDoc::openapi();

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
