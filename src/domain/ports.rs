use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::cart::{CartLineView, CartOwner, CartView, ReservationPolicy};
use super::catalog::{Category, ProductFilter, ProductView, SimilarQuery};
use super::errors::DomainError;
use super::order::{CheckoutDetails, ListResult, OrderScope, OrderView, Transitioned};
use super::review::{NewReview, ReviewView};
use super::status::Transition;

#[cfg_attr(test, mockall::automock)]
pub trait CartRepository: Send + Sync + 'static {
    fn get_or_create(&self, owner: &CartOwner) -> Result<CartView, DomainError>;
    fn add_line(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
        policy: ReservationPolicy,
        now: DateTime<Utc>,
    ) -> Result<CartLineView, DomainError>;
    fn update_quantity(
        &self,
        owner: &CartOwner,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineView, DomainError>;
    fn remove_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<(), DomainError>;
    fn clear(&self, owner: &CartOwner) -> Result<usize, DomainError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait OrderRepository: Send + Sync + 'static {
    /// Turn the owner's cart into an order in one transaction.
    fn create_from_cart(
        &self,
        owner: &CartOwner,
        details: CheckoutDetails,
    ) -> Result<OrderView, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError>;
    fn list(&self, scope: &OrderScope, page: i64, limit: i64) -> Result<ListResult, DomainError>;
    /// Apply `transition` under a row lock. A no-op writes nothing.
    fn transition(
        &self,
        id: Uuid,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, DomainError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait CatalogRepository: Send + Sync + 'static {
    fn find_product(&self, id: Uuid) -> Result<Option<ProductView>, DomainError>;
    /// Fetch by slug without counting a view.
    fn find_by_slug(&self, slug: &str) -> Result<Option<ProductView>, DomainError>;
    /// Fetch by slug and count the view.
    fn view_product(&self, slug: &str) -> Result<Option<ProductView>, DomainError>;
    fn list_products(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, DomainError>;
    fn list_similar(&self, query: &SimilarQuery) -> Result<Vec<ProductView>, DomainError>;
    fn categories(&self) -> Result<Vec<Category>, DomainError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ReviewRepository: Send + Sync + 'static {
    fn create(&self, review: NewReview) -> Result<ReviewView, DomainError>;
    fn list_approved(&self, product_id: Uuid) -> Result<Vec<ReviewView>, DomainError>;
    /// Approve reviews and refresh the rating of every affected product.
    fn approve(&self, ids: &[Uuid]) -> Result<usize, DomainError>;
    fn mark_verified(&self, ids: &[Uuid]) -> Result<usize, DomainError>;
    /// Returns the review's helpful count afterwards.
    fn mark_helpful(&self, review_id: Uuid, user_id: Uuid) -> Result<i32, DomainError>;
    fn unmark_helpful(&self, review_id: Uuid, user_id: Uuid) -> Result<i32, DomainError>;
}
