use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{money, run, timestamp, AppState, MaybeUser, Owner};
use crate::domain::order::{
    BatchOutcome, CheckoutRequest, DeliveryMethod, OrderLineView, OrderScope, OrderView,
};
use crate::domain::status::{OrderStatus, Transition};
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub name: String,
    pub email: String,
    /// Russian number, e.g. "+7 912 345-67-89".
    pub phone: String,
    /// One of courier_moscow, cdek_pickup, russian_post, pickup.
    pub delivery_method: String,
    /// Required unless delivery_method is pickup.
    pub delivery_address: Option<String>,
    pub comment: Option<String>,
    pub promo_code: Option<String>,
}

impl From<CreateOrderRequest> for CheckoutRequest {
    fn from(r: CreateOrderRequest) -> Self {
        CheckoutRequest {
            name: r.name,
            email: r.email,
            phone: r.phone,
            delivery_method: r.delivery_method,
            delivery_address: r.delivery_address,
            comment: r.comment,
            promo_code: r.promo_code,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price captured at checkout.
    pub unit_price: String,
    pub total_price: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub delivery_method: String,
    pub delivery_method_label: String,
    pub delivery_address: String,
    pub delivery_cost: String,
    pub total_amount: String,
    pub discount_amount: String,
    pub final_amount: String,
    pub promo_code: String,
    pub comment: String,
    pub status: OrderStatus,
    pub status_label: String,
    pub track_number: String,
    pub paid_at: Option<String>,
    pub shipped_at: Option<String>,
    pub delivered_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub lines: Vec<OrderLineResponse>,
}

impl From<OrderLineView> for OrderLineResponse {
    fn from(l: OrderLineView) -> Self {
        OrderLineResponse {
            id: l.id,
            product_id: l.product_id,
            quantity: l.quantity,
            total_price: money(&l.total_price()),
            unit_price: money(&l.unit_price),
        }
    }
}

impl From<OrderView> for OrderResponse {
    fn from(o: OrderView) -> Self {
        let final_amount = money(&o.final_amount());
        let delivery_method_label = o
            .delivery_method
            .parse::<DeliveryMethod>()
            .map(|m| m.label().to_string())
            .unwrap_or_else(|_| o.delivery_method.clone());
        let f = o.fulfillment;
        OrderResponse {
            id: o.id,
            user_id: o.user_id,
            name: o.name,
            email: o.email,
            phone: o.phone,
            delivery_method: o.delivery_method,
            delivery_method_label,
            delivery_address: o.delivery_address,
            delivery_cost: money(&o.delivery_cost),
            total_amount: money(&o.total_amount),
            discount_amount: money(&o.discount_amount),
            final_amount,
            promo_code: o.promo_code,
            comment: o.comment,
            status: f.status,
            status_label: f.status.label().to_string(),
            track_number: f.track_number,
            paid_at: f.paid_at.as_ref().map(timestamp),
            shipped_at: f.shipped_at.as_ref().map(timestamp),
            delivered_at: f.delivered_at.as_ref().map(timestamp),
            created_at: timestamp(&o.created_at),
            updated_at: timestamp(&o.updated_at),
            lines: o.lines.into_iter().map(OrderLineResponse::from).collect(),
        }
    }
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Guest lookup; ignored when X-User-Id is present.
    pub email: Option<String>,
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

// ── Status changes ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ShipOrderRequest {
    pub track_number: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchTransitionRequest {
    pub ids: Vec<Uuid>,
    pub transition: Transition,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RejectedOrder {
    pub id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchTransitionResponse {
    pub updated: Vec<Uuid>,
    /// Already in the requested state; nothing was written.
    pub unchanged: Vec<Uuid>,
    pub rejected: Vec<RejectedOrder>,
}

impl From<BatchOutcome> for BatchTransitionResponse {
    fn from(outcome: BatchOutcome) -> Self {
        BatchTransitionResponse {
            updated: outcome.updated,
            unchanged: outcome.unchanged,
            rejected: outcome
                .rejected
                .into_iter()
                .map(|(id, reason)| RejectedOrder { id, reason })
                .collect(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Turns the caller's cart into an order. Line prices are captured from the
/// current product prices, an `OrderCreated` outbox event is written and the
/// cart is emptied, all in one database transaction.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid details or empty cart"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    state: web::Data<AppState>,
    owner: Owner,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let request = CheckoutRequest::from(body.into_inner());
    let order = run(state, move |s| s.orders.create_order(&owner.0, request)).await?;
    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

/// GET /orders/{id}
///
/// Returns the order together with its order lines.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let order = run(state, move |s| s.orders.get_order(id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// GET /orders
///
/// Registered users see their own orders. Guests pass the `email` used at
/// checkout and see the guest orders placed with it.
#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("X-User-Id" = Option<Uuid>, Header, description = "Registered user"),
        ("email" = Option<String>, Query, description = "Guest email"),
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 400, description = "Neither X-User-Id nor email given"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let scope = match (user.0, params.email) {
        (Some(id), _) => OrderScope::User(id),
        (None, Some(email)) if !email.trim().is_empty() => {
            OrderScope::GuestEmail(email.trim().to_string())
        }
        _ => {
            return Err(AppError::BadRequest(
                "X-User-Id header or email parameter is required".to_string(),
            ))
        }
    };
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);

    let result = run(state, move |s| s.orders.list_orders(&scope, page, limit)).await?;

    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        items: result.items.into_iter().map(OrderResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

fn order_ok(order: OrderView) -> HttpResponse {
    HttpResponse::Ok().json(OrderResponse::from(order))
}

/// POST /orders/{id}/cancel
///
/// Allowed from pending, paid and processing.
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already shipped, delivered or cancelled"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    Ok(order_ok(run(state, move |s| s.orders.cancel(id)).await?))
}

/// POST /orders/{id}/paid
#[utoipa::path(
    post,
    path = "/orders/{id}/paid",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order paid", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "orders"
)]
pub async fn mark_paid(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    Ok(order_ok(run(state, move |s| s.orders.mark_paid(id)).await?))
}

/// POST /orders/{id}/processing
#[utoipa::path(
    post,
    path = "/orders/{id}/processing",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order in processing", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "orders"
)]
pub async fn mark_processing(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    Ok(order_ok(run(state, move |s| s.orders.mark_processing(id)).await?))
}

/// POST /orders/{id}/shipped
///
/// The body is optional; a `track_number` in it is stored on the order.
#[utoipa::path(
    post,
    path = "/orders/{id}/shipped",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body(content = ShipOrderRequest, description = "Optional tracking number"),
    responses(
        (status = 200, description = "Order shipped", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "orders"
)]
pub async fn mark_shipped(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: Option<web::Json<ShipOrderRequest>>,
) -> Result<HttpResponse, AppError> {
    let track_number = body
        .map(|b| b.into_inner())
        .unwrap_or_default()
        .track_number
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let id = path.into_inner();
    Ok(order_ok(run(state, move |s| s.orders.mark_shipped(id, track_number)).await?))
}

/// POST /orders/{id}/delivered
///
/// Only shipped orders can be delivered.
#[utoipa::path(
    post,
    path = "/orders/{id}/delivered",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order delivered", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "orders"
)]
pub async fn mark_delivered(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    Ok(order_ok(run(state, move |s| s.orders.mark_delivered(id)).await?))
}

/// POST /orders/batch
///
/// Applies one transition to many orders. Each order changes in its own
/// transaction; orders that cannot take the transition are reported in
/// `rejected` and do not affect the others.
#[utoipa::path(
    post,
    path = "/orders/batch",
    request_body = BatchTransitionRequest,
    responses(
        (status = 200, description = "Per-order outcome", body = BatchTransitionResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn batch_transition(
    state: web::Data<AppState>,
    body: web::Json<BatchTransitionRequest>,
) -> Result<HttpResponse, AppError> {
    let BatchTransitionRequest { ids, transition } = body.into_inner();
    let outcome = run(state, move |s| s.orders.batch_transition(&ids, &transition)).await?;
    Ok(HttpResponse::Ok().json(BatchTransitionResponse::from(outcome)))
}
