pub mod cart_repo;
pub mod catalog_repo;
pub mod models;
pub mod order_repo;
pub mod review_repo;

#[cfg(test)]
pub(crate) mod test_support;

use diesel::result::Error as DieselError;

use crate::domain::errors::DomainError;

pub use cart_repo::DieselCartRepository;
pub use catalog_repo::DieselCatalogRepository;
pub use order_repo::DieselOrderRepository;
pub use review_repo::DieselReviewRepository;

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<DieselError> for DomainError {
    fn from(e: DieselError) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

