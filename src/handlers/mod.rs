pub mod cart;
pub mod orders;
pub mod products;
pub mod reviews;

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::application::{CartService, CatalogService, OrderService, ReviewService};
use crate::db::DbPool;
use crate::domain::cart::{CartOwner, ReservationPolicy};
use crate::domain::errors::DomainError;
use crate::errors::AppError;
use crate::infrastructure::{
    DieselCartRepository, DieselCatalogRepository, DieselOrderRepository, DieselReviewRepository,
};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const SESSION_KEY_HEADER: &str = "X-Session-Key";

/// Services shared by every worker, wired to the Diesel repositories.
pub struct AppState {
    pub carts: CartService<DieselCartRepository>,
    pub orders: OrderService<DieselOrderRepository>,
    pub catalog: CatalogService<DieselCatalogRepository>,
    pub reviews: ReviewService<DieselReviewRepository, DieselCatalogRepository>,
}

impl AppState {
    pub fn new(pool: DbPool, policy: ReservationPolicy) -> Self {
        Self {
            carts: CartService::new(DieselCartRepository::new(pool.clone()), policy),
            orders: OrderService::new(DieselOrderRepository::new(pool.clone())),
            catalog: CatalogService::new(DieselCatalogRepository::new(pool.clone())),
            reviews: ReviewService::new(
                DieselReviewRepository::new(pool.clone()),
                DieselCatalogRepository::new(pool),
            ),
        }
    }
}

/// Run a blocking service call on actix's thread pool.
pub(crate) async fn run<T, F>(state: web::Data<AppState>, f: F) -> Result<T, AppError>
where
    F: FnOnce(&AppState) -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    Ok(web::block(move || f(state.get_ref())).await??)
}

pub(crate) fn money(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Result<Option<&'a str>, AppError> {
    match req.headers().get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{name} header is not valid text"))),
    }
}

fn user_id(req: &HttpRequest) -> Result<Option<Uuid>, AppError> {
    header_value(req, USER_ID_HEADER)?
        .map(|raw| {
            raw.trim()
                .parse::<Uuid>()
                .map_err(|_| AppError::BadRequest(format!("{USER_ID_HEADER} must be a UUID")))
        })
        .transpose()
}

fn cart_owner(req: &HttpRequest) -> Result<CartOwner, AppError> {
    if let Some(id) = user_id(req)? {
        return Ok(CartOwner::User(id));
    }
    match header_value(req, SESSION_KEY_HEADER)? {
        Some(key) => Ok(CartOwner::session(key)?),
        None => Err(AppError::BadRequest(format!(
            "either {USER_ID_HEADER} or {SESSION_KEY_HEADER} is required"
        ))),
    }
}

/// Whoever owns the cart for this request: the registered user when
/// `X-User-Id` is present, the anonymous session otherwise.
#[derive(Debug, Clone)]
pub struct Owner(pub CartOwner);

impl FromRequest for Owner {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(cart_owner(req).map(Owner))
    }
}

/// A registered user; requests without `X-User-Id` are rejected.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(user_id(req).and_then(|id| {
            id.map(CurrentUser).ok_or_else(|| {
                AppError::BadRequest(format!("{USER_ID_HEADER} header is required"))
            })
        }))
    }
}

/// The registered user, if the request names one.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Uuid>);

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(user_id(req).map(MaybeUser))
    }
}
