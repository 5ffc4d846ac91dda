//! Offer service — provider bids on service requests.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{Offer, User, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("service request not found: {0}")]
    RequestNotFound(Uuid),
    #[error("only providers can make offers")]
    Forbidden,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateOfferInput {
    pub service_request_id: Uuid,
    pub price: f64,
    /// Minutes.
    pub estimated_duration: i32,
    pub message: Option<String>,
}

const OFFER_COLUMNS: &str =
    "id, service_request_id, provider_id, price, estimated_duration, message, status, created_at";

fn map_offer(row: &PgRow) -> Offer {
    Offer {
        id: row.get("id"),
        service_request_id: row.get("service_request_id"),
        provider_id: row.get("provider_id"),
        price: row.get("price"),
        estimated_duration: row.get("estimated_duration"),
        message: row.get("message"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

/// Place an offer against an existing request.
///
/// # Errors
///
/// `Forbidden` for clients, `RequestNotFound` if the referenced request does
/// not exist, or a database error.
pub async fn create(pool: &PgPool, provider: &User, input: CreateOfferInput) -> Result<Offer, OfferError> {
    if provider.role != UserRole::Provider {
        return Err(OfferError::Forbidden);
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM service_requests WHERE id = $1)")
        .bind(input.service_request_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(OfferError::RequestNotFound(input.service_request_id));
    }

    let row = sqlx::query(&format!(
        "INSERT INTO offers (service_request_id, provider_id, price, estimated_duration, message)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {OFFER_COLUMNS}"
    ))
    .bind(input.service_request_id)
    .bind(provider.id)
    .bind(input.price)
    .bind(input.estimated_duration)
    .bind(&input.message)
    .fetch_one(pool)
    .await?;

    let offer = map_offer(&row);
    info!(offer_id = %offer.id, request_id = %offer.service_request_id, provider_id = %provider.id, "offer placed");
    Ok(offer)
}

/// List offers visible to `user`: providers see their own bids, clients see
/// the bids on their requests.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_for(pool: &PgPool, user: &User) -> Result<Vec<Offer>, OfferError> {
    let rows = match user.role {
        UserRole::Provider => {
            sqlx::query(&format!(
                "SELECT {OFFER_COLUMNS} FROM offers WHERE provider_id = $1 ORDER BY created_at DESC"
            ))
            .bind(user.id)
            .fetch_all(pool)
            .await?
        }
        UserRole::Client => {
            sqlx::query(&format!(
                "SELECT {OFFER_COLUMNS} FROM offers
                 WHERE service_request_id IN (SELECT id FROM service_requests WHERE client_id = $1)
                 ORDER BY created_at DESC"
            ))
            .bind(user.id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.iter().map(map_offer).collect())
}
