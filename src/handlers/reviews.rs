use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{run, timestamp, AppState, CurrentUser};
use crate::domain::review::{ReviewRequest, ReviewView};
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitReviewRequest {
    /// 1 to 5.
    pub rating: i32,
    pub title: String,
    pub text: String,
    pub pros: Option<String>,
    pub cons: Option<String>,
}

impl From<SubmitReviewRequest> for ReviewRequest {
    fn from(r: SubmitReviewRequest) -> Self {
        ReviewRequest {
            rating: r.rating,
            title: r.title,
            text: r.text,
            pros: r.pros,
            cons: r.cons,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewResponse {
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
    pub created_at: String,
}

impl From<ReviewView> for ReviewResponse {
    fn from(r: ReviewView) -> Self {
        ReviewResponse {
            id: r.id,
            product_id: r.product_id,
            user_id: r.user_id,
            rating: r.rating,
            title: r.title,
            text: r.text,
            pros: r.pros,
            cons: r.cons,
            is_approved: r.is_approved,
            is_verified_buyer: r.is_verified_buyer,
            helpful_count: r.helpful_count,
            created_at: timestamp(&r.created_at),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewIdsRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModerationResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HelpfulResponse {
    pub helpful_count: i32,
}

/// POST /products/{id}/reviews
///
/// Stores the review unapproved; it shows up on the product once approved.
#[utoipa::path(
    post,
    path = "/products/{id}/reviews",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
        ("X-User-Id" = Uuid, Header, description = "Reviewing user"),
    ),
    request_body = SubmitReviewRequest,
    responses(
        (status = 201, description = "Review stored for moderation", body = ReviewResponse),
        (status = 400, description = "Invalid review or already reviewed"),
        (status = 404, description = "Product not found"),
    ),
    tag = "reviews"
)]
pub async fn submit_review(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<SubmitReviewRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let request = ReviewRequest::from(body.into_inner());
    let review = run(state, move |s| s.reviews.submit(product_id, user.0, request)).await?;
    Ok(HttpResponse::Created().json(ReviewResponse::from(review)))
}

/// POST /reviews/approve
///
/// Publishes the reviews and recomputes the rating of their products.
#[utoipa::path(
    post,
    path = "/reviews/approve",
    request_body = ReviewIdsRequest,
    responses(
        (status = 200, description = "Reviews approved", body = ModerationResponse),
    ),
    tag = "reviews"
)]
pub async fn approve_reviews(
    state: web::Data<AppState>,
    body: web::Json<ReviewIdsRequest>,
) -> Result<HttpResponse, AppError> {
    let ids = body.into_inner().ids;
    let updated = run(state, move |s| s.reviews.approve(&ids)).await?;
    Ok(HttpResponse::Ok().json(ModerationResponse { updated }))
}

/// POST /reviews/verify
#[utoipa::path(
    post,
    path = "/reviews/verify",
    request_body = ReviewIdsRequest,
    responses(
        (status = 200, description = "Reviews marked as verified purchases", body = ModerationResponse),
    ),
    tag = "reviews"
)]
pub async fn verify_reviews(
    state: web::Data<AppState>,
    body: web::Json<ReviewIdsRequest>,
) -> Result<HttpResponse, AppError> {
    let ids = body.into_inner().ids;
    let updated = run(state, move |s| s.reviews.verify(&ids)).await?;
    Ok(HttpResponse::Ok().json(ModerationResponse { updated }))
}

/// POST /reviews/{id}/helpful
///
/// Idempotent per user.
#[utoipa::path(
    post,
    path = "/reviews/{id}/helpful",
    params(
        ("id" = Uuid, Path, description = "Review UUID"),
        ("X-User-Id" = Uuid, Header, description = "Voting user"),
    ),
    responses(
        (status = 200, description = "Current helpful count", body = HelpfulResponse),
        (status = 404, description = "Review not found"),
    ),
    tag = "reviews"
)]
pub async fn mark_helpful(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let review_id = path.into_inner();
    let helpful_count = run(state, move |s| s.reviews.mark_helpful(review_id, user.0)).await?;
    Ok(HttpResponse::Ok().json(HelpfulResponse { helpful_count }))
}

/// DELETE /reviews/{id}/helpful
#[utoipa::path(
    delete,
    path = "/reviews/{id}/helpful",
    params(
        ("id" = Uuid, Path, description = "Review UUID"),
        ("X-User-Id" = Uuid, Header, description = "Voting user"),
    ),
    responses(
        (status = 200, description = "Current helpful count", body = HelpfulResponse),
        (status = 404, description = "Review not found"),
    ),
    tag = "reviews"
)]
pub async fn unmark_helpful(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let review_id = path.into_inner();
    let helpful_count = run(state, move |s| s.reviews.unmark_helpful(review_id, user.0)).await?;
    Ok(HttpResponse::Ok().json(HelpfulResponse { helpful_count }))
}
