//! Review service — post-service ratings and mean-rating maintenance.
//!
//! DESIGN
//! ======
//! One review per (request, reviewer), enforced by a unique constraint; the
//! reviewee is always the other party of the request. Each insert recomputes
//! the reviewee's mean rating rounded to one decimal. The recompute is not
//! transactional with the insert; a concurrent insert can briefly leave the
//! mean one review behind, which the next insert corrects.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{Review, User};
use crate::services::request::{self, RequestError};

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("service request not found: {0}")]
    RequestNotFound(Uuid),
    #[error("reviewer is not a participant of this request")]
    Forbidden,
    #[error("request has no counterparty to review yet")]
    NoReviewee,
    #[error("this request was already reviewed by this user")]
    Duplicate,
    #[error("rating must be between 1 and 5")]
    InvalidRating,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateReviewInput {
    pub service_request_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
}

fn map_review(row: &PgRow) -> Review {
    Review {
        id: row.get("id"),
        service_request_id: row.get("service_request_id"),
        reviewer_id: row.get("reviewer_id"),
        reviewee_id: row.get("reviewee_id"),
        rating: row.get("rating"),
        comment: row.get("comment"),
        created_at: row.get("created_at"),
    }
}

/// Mean rating rounded to one decimal place.
#[must_use]
pub fn round_rating(mean: f64) -> f64 {
    (mean * 10.0).round() / 10.0
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Record a review and recompute the reviewee's mean rating.
///
/// # Errors
///
/// `InvalidRating` outside [1, 5], `RequestNotFound`, `Forbidden` for
/// non-participants, `NoReviewee` before a provider is assigned,
/// `Duplicate` on a second review by the same user, or a database error.
pub async fn create(pool: &PgPool, reviewer: &User, input: CreateReviewInput) -> Result<Review, ReviewError> {
    if !(1..=5).contains(&input.rating) {
        return Err(ReviewError::InvalidRating);
    }

    let req = request::fetch(pool, input.service_request_id).await.map_err(|e| match e {
        RequestError::NotFound(id) => ReviewError::RequestNotFound(id),
        RequestError::Db(e) => ReviewError::Db(e),
        RequestError::Forbidden | RequestError::Conflict => ReviewError::Forbidden,
    })?;

    if !req.is_participant(reviewer.id) {
        return Err(ReviewError::Forbidden);
    }
    let reviewee_id = req.counterparty(reviewer.id).ok_or(ReviewError::NoReviewee)?;

    let row = sqlx::query(
        "INSERT INTO reviews (service_request_id, reviewer_id, reviewee_id, rating, comment)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, service_request_id, reviewer_id, reviewee_id, rating, comment, created_at",
    )
    .bind(input.service_request_id)
    .bind(reviewer.id)
    .bind(reviewee_id)
    .bind(input.rating)
    .bind(&input.comment)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ReviewError::Duplicate
        } else {
            ReviewError::Db(e)
        }
    })?;

    recompute_rating(pool, reviewee_id).await?;

    let review = map_review(&row);
    info!(review_id = %review.id, reviewee_id = %reviewee_id, rating = review.rating, "review recorded");
    Ok(review)
}

/// Recompute and store a user's mean rating, one decimal place.
///
/// # Errors
///
/// Returns a database error if either query fails.
pub async fn recompute_rating(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    let mean: Option<f64> = sqlx::query_scalar("SELECT AVG(rating)::DOUBLE PRECISION FROM reviews WHERE reviewee_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    sqlx::query("UPDATE users SET rating = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(mean.map(round_rating))
        .execute(pool)
        .await?;
    Ok(())
}

/// Reviews received by a user, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_for_reviewee(pool: &PgPool, user_id: Uuid) -> Result<Vec<Review>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, service_request_id, reviewer_id, reviewee_id, rating, comment, created_at
         FROM reviews WHERE reviewee_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_review).collect())
}

#[cfg(test)]
#[path = "review_test.rs"]
mod tests;
