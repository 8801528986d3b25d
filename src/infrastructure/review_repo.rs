use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::ReviewRepository;
use crate::domain::review::{average_rating, NewReview, ReviewView};
use crate::schema::{products, review_helpful_marks, reviews};

use super::models::{NewHelpfulMarkRow, NewReviewRow, ReviewRow};

fn review_view(row: ReviewRow) -> ReviewView {
    ReviewView {
        id: row.id,
        product_id: row.product_id,
        user_id: row.user_id,
        rating: row.rating,
        title: row.title,
        text: row.body,
        pros: row.pros,
        cons: row.cons,
        is_approved: row.is_approved,
        is_verified_buyer: row.is_verified_buyer,
        helpful_count: row.helpful_count,
        created_at: row.created_at,
    }
}

/// Recompute a product's average from its approved reviews.
fn refresh_rating(conn: &mut PgConnection, product_id: Uuid) -> QueryResult<usize> {
    let ratings = reviews::table
        .filter(reviews::product_id.eq(product_id))
        .filter(reviews::is_approved.eq(true))
        .select(reviews::rating)
        .load::<i32>(conn)?;

    diesel::update(products::table.find(product_id))
        .set((
            products::average_rating.eq(average_rating(&ratings)),
            products::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
}

fn helpful_count(conn: &mut PgConnection, review_id: Uuid) -> Result<i32, DomainError> {
    reviews::table
        .find(review_id)
        .select(reviews::helpful_count)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("Review"))
}

pub struct DieselReviewRepository {
    pool: DbPool,
}

impl DieselReviewRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ReviewRepository for DieselReviewRepository {
    fn create(&self, review: NewReview) -> Result<ReviewView, DomainError> {
        let mut conn = self.pool.get()?;

        let row = diesel::insert_into(reviews::table)
            .values(&NewReviewRow {
                id: Uuid::new_v4(),
                product_id: review.product_id,
                user_id: review.user_id,
                rating: review.rating,
                title: review.title,
                body: review.text,
                pros: review.pros,
                cons: review.cons,
            })
            .returning(ReviewRow::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    DomainError::validation("this product has already been reviewed by the user")
                }
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    DomainError::not_found("Product")
                }
                other => other.into(),
            })?;

        Ok(review_view(row))
    }

    fn list_approved(&self, product_id: Uuid) -> Result<Vec<ReviewView>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = reviews::table
            .filter(reviews::product_id.eq(product_id))
            .filter(reviews::is_approved.eq(true))
            .select(ReviewRow::as_select())
            .order(reviews::created_at.desc())
            .load(&mut conn)?;

        Ok(rows.into_iter().map(review_view).collect())
    }

    fn approve(&self, ids: &[Uuid]) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(reviews::table.filter(reviews::id.eq_any(ids)))
                .set((
                    reviews::is_approved.eq(true),
                    reviews::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            let product_ids = reviews::table
                .filter(reviews::id.eq_any(ids))
                .select(reviews::product_id)
                .distinct()
                .load::<Uuid>(conn)?;
            for product_id in product_ids {
                refresh_rating(conn, product_id)?;
            }

            Ok(updated)
        })
    }

    fn mark_verified(&self, ids: &[Uuid]) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;

        let updated = diesel::update(reviews::table.filter(reviews::id.eq_any(ids)))
            .set((
                reviews::is_verified_buyer.eq(true),
                reviews::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok(updated)
    }

    fn mark_helpful(&self, review_id: Uuid, user_id: Uuid) -> Result<i32, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            helpful_count(conn, review_id)?;

            let inserted = diesel::insert_into(review_helpful_marks::table)
                .values(&NewHelpfulMarkRow {
                    id: Uuid::new_v4(),
                    review_id,
                    user_id,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted > 0 {
                diesel::update(reviews::table.find(review_id))
                    .set(reviews::helpful_count.eq(reviews::helpful_count + 1))
                    .execute(conn)?;
            }

            helpful_count(conn, review_id)
        })
    }

    fn unmark_helpful(&self, review_id: Uuid, user_id: Uuid) -> Result<i32, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            helpful_count(conn, review_id)?;

            let removed = diesel::delete(
                review_helpful_marks::table
                    .filter(review_helpful_marks::review_id.eq(review_id))
                    .filter(review_helpful_marks::user_id.eq(user_id)),
            )
            .execute(conn)?;
            if removed > 0 {
                diesel::update(
                    reviews::table
                        .find(review_id)
                        .filter(reviews::helpful_count.gt(0)),
                )
                .set(reviews::helpful_count.eq(reviews::helpful_count - 1))
                .execute(conn)?;
            }

            helpful_count(conn, review_id)
        })
    }
}
