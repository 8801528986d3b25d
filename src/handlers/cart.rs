use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{money, run, timestamp, AppState, Owner};
use crate::domain::cart::{is_reserved, seconds_left, CartLineView, CartView};
use crate::domain::catalog::StockStatus;
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    /// Defaults to 1.
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    /// Current product price, e.g. "1000.00".
    pub unit_price: String,
    pub stock_status: StockStatus,
    pub quantity: i32,
    pub total_price: String,
    pub reserved_until: Option<String>,
    pub is_reserved: bool,
    pub reservation_seconds_left: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub lines: Vec<CartLineResponse>,
    pub items_count: i64,
    pub total: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearCartResponse {
    pub removed: usize,
}

impl From<CartLineView> for CartLineResponse {
    fn from(line: CartLineView) -> Self {
        let now = Utc::now();
        CartLineResponse {
            id: line.id,
            product_id: line.product_id,
            total_price: money(&line.total_price()),
            unit_price: money(&line.unit_price),
            stock_status: line.stock_status,
            quantity: line.quantity,
            reserved_until: line.reserved_until.as_ref().map(timestamp),
            is_reserved: is_reserved(line.reserved_until, now),
            reservation_seconds_left: seconds_left(line.reserved_until, now),
            product_name: line.product_name,
        }
    }
}

impl From<CartView> for CartResponse {
    fn from(cart: CartView) -> Self {
        CartResponse {
            id: cart.id,
            items_count: cart.items_count(),
            total: money(&cart.total()),
            updated_at: timestamp(&cart.updated_at),
            lines: cart.lines.into_iter().map(CartLineResponse::from).collect(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /cart
///
/// Returns the caller's cart, creating an empty one on first access.
#[utoipa::path(
    get,
    path = "/cart",
    params(
        ("X-User-Id" = Option<Uuid>, Header, description = "Registered user"),
        ("X-Session-Key" = Option<String>, Header, description = "Anonymous session key"),
    ),
    responses(
        (status = 200, description = "Current cart", body = CartResponse),
        (status = 400, description = "No usable identity headers"),
    ),
    tag = "cart"
)]
pub async fn get_cart(
    state: web::Data<AppState>,
    owner: Owner,
) -> Result<HttpResponse, AppError> {
    let cart = run(state, move |s| s.carts.cart(&owner.0)).await?;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// POST /cart/items
///
/// Adds a product to the cart. Adding a product that is already in the cart
/// increases its quantity instead of creating a second line.
#[utoipa::path(
    post,
    path = "/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 201, description = "Line created or incremented", body = CartLineResponse),
        (status = 400, description = "Invalid quantity or product out of stock"),
        (status = 404, description = "Product not found"),
    ),
    tag = "cart"
)]
pub async fn add_item(
    state: web::Data<AppState>,
    owner: Owner,
    body: web::Json<AddItemRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let line = run(state, move |s| {
        s.carts.add(&owner.0, body.product_id, body.quantity)
    })
    .await?;
    Ok(HttpResponse::Created().json(CartLineResponse::from(line)))
}

/// PATCH /cart/items/{id}
#[utoipa::path(
    patch,
    path = "/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart line UUID")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Quantity replaced", body = CartLineResponse),
        (status = 400, description = "Quantity below 1"),
        (status = 404, description = "Line not in the caller's cart"),
    ),
    tag = "cart"
)]
pub async fn update_item(
    state: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
    body: web::Json<UpdateQuantityRequest>,
) -> Result<HttpResponse, AppError> {
    let line_id = path.into_inner();
    let quantity = body.quantity;
    let line = run(state, move |s| {
        s.carts.update_quantity(&owner.0, line_id, quantity)
    })
    .await?;
    Ok(HttpResponse::Ok().json(CartLineResponse::from(line)))
}

/// DELETE /cart/items/{id}
#[utoipa::path(
    delete,
    path = "/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart line UUID")),
    responses(
        (status = 204, description = "Line removed"),
        (status = 404, description = "Line not in the caller's cart"),
    ),
    tag = "cart"
)]
pub async fn remove_item(
    state: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let line_id = path.into_inner();
    run(state, move |s| s.carts.remove(&owner.0, line_id)).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /cart/clear
#[utoipa::path(
    post,
    path = "/cart/clear",
    responses(
        (status = 200, description = "All lines removed", body = ClearCartResponse),
    ),
    tag = "cart"
)]
pub async fn clear_cart(
    state: web::Data<AppState>,
    owner: Owner,
) -> Result<HttpResponse, AppError> {
    let removed = run(state, move |s| s.carts.clear(&owner.0)).await?;
    Ok(HttpResponse::Ok().json(ClearCartResponse { removed }))
}
