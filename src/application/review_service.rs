use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::ports::{CatalogRepository, ReviewRepository};
use crate::domain::review::{NewReview, ReviewRequest, ReviewView};

pub struct ReviewService<R, C> {
    repo: R,
    catalog: C,
}

impl<R: ReviewRepository, C: CatalogRepository> ReviewService<R, C> {
    pub fn new(repo: R, catalog: C) -> Self {
        Self { repo, catalog }
    }

    /// Store a review for moderation. New reviews are not visible until
    /// approved.
    pub fn submit(
        &self,
        product_id: Uuid,
        user_id: Uuid,
        request: ReviewRequest,
    ) -> Result<ReviewView, DomainError> {
        if self.catalog.find_product(product_id)?.is_none() {
            return Err(DomainError::not_found("Product"));
        }
        let review = NewReview::parse(product_id, user_id, request)?;
        let created = self.repo.create(review)?;
        log::info!(
            "review {} ({} stars) submitted for product {}",
            created.id,
            created.rating,
            product_id
        );
        Ok(created)
    }

    pub fn list_for_product(&self, product_id: Uuid) -> Result<Vec<ReviewView>, DomainError> {
        self.repo.list_approved(product_id)
    }

    pub fn approve(&self, ids: &[Uuid]) -> Result<usize, DomainError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let approved = self.repo.approve(ids)?;
        log::info!("approved {} of {} reviews", approved, ids.len());
        Ok(approved)
    }

    pub fn verify(&self, ids: &[Uuid]) -> Result<usize, DomainError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.repo.mark_verified(ids)
    }

    pub fn mark_helpful(&self, review_id: Uuid, user_id: Uuid) -> Result<i32, DomainError> {
        self.repo.mark_helpful(review_id, user_id)
    }

    pub fn unmark_helpful(&self, review_id: Uuid, user_id: Uuid) -> Result<i32, DomainError> {
        self.repo.unmark_helpful(review_id, user_id)
    }
}
