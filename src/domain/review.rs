use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct ReviewRequest {
    pub rating: i32,
    pub title: String,
    pub text: String,
    pub pros: Option<String>,
    pub cons: Option<String>,
}

/// A review that passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub title: String,
    pub text: String,
    pub pros: String,
    pub cons: String,
}

impl NewReview {
    pub fn parse(product_id: Uuid, user_id: Uuid, req: ReviewRequest) -> Result<Self, DomainError> {
        if !(1..=5).contains(&req.rating) {
            return Err(DomainError::validation("rating must be between 1 and 5"));
        }
        let title = req.title.trim().to_string();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(DomainError::validation(format!(
                "title must be 1 to {MAX_TITLE_LEN} characters"
            )));
        }
        let text = req.text.trim().to_string();
        if text.is_empty() {
            return Err(DomainError::validation("review text must not be empty"));
        }
        Ok(Self {
            product_id,
            user_id,
            rating: req.rating,
            title,
            text,
            pros: req.pros.map(|p| p.trim().to_string()).unwrap_or_default(),
            cons: req.cons.map(|c| c.trim().to_string()).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReviewView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub title: String,
    pub text: String,
    pub pros: String,
    pub cons: String,
    pub is_approved: bool,
    pub is_verified_buyer: bool,
    pub helpful_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Mean of approved ratings rounded half-up to two places; 0 without
/// ratings.
pub fn average_rating(ratings: &[i32]) -> BigDecimal {
    if ratings.is_empty() {
        return BigDecimal::from(0);
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let count = i64::try_from(ratings.len()).unwrap_or(i64::MAX);
    (BigDecimal::from(sum) / BigDecimal::from(count)).with_scale_round(2, RoundingMode::HalfUp)
}
