//! Service-request service — creation, listing, matching lifecycle.
//!
//! DESIGN
//! ======
//! Requests move through `requested -> accepted -> in_progress -> completed`
//! (with `matched` and `cancelled` as side exits). Acceptance is first-wins:
//! only a `requested` request can be accepted, and the accepting provider is
//! written onto the row. Rejections never mutate the request; they append to
//! a rejection log so other providers can still accept.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::models::{ServiceRequest, ServiceStatus, User, UserRole};

/// Cap on the provider nearby feed.
const NEARBY_LIMIT: i64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("service request not found: {0}")]
    NotFound(Uuid),
    #[error("operation not allowed for this user")]
    Forbidden,
    #[error("request is no longer available")]
    Conflict,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateRequestInput {
    pub category: String,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    /// Minutes.
    pub estimated_duration: Option<i32>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RejectInput {
    pub reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct StatusUpdateInput {
    pub status: ServiceStatus,
    pub final_price: Option<f64>,
}

/// One entry in the provider nearby feed: an open request plus the client's
/// display name.
#[derive(Debug, serde::Serialize)]
pub struct NearbyRequest {
    pub id: Uuid,
    pub category: String,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    /// Minutes.
    pub estimated_duration: Option<i32>,
    pub client_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Aggregated totals over a provider's completed requests.
#[derive(Debug, serde::Serialize)]
pub struct EarningsSummary {
    pub total_earnings: f64,
    pub total_services: i64,
    pub monthly_earnings: f64,
    pub monthly_services: i64,
    pub average_service_value: f64,
    pub provider_rating: Option<f64>,
}

// =============================================================================
// MAPPING & PURE CHECKS
// =============================================================================

const REQUEST_COLUMNS: &str = "id, client_id, provider_id, category, title, description, status, \
     latitude, longitude, address, budget_min, budget_max, final_price, estimated_duration, \
     started_at, completed_at, created_at, updated_at";

pub(crate) fn map_request(row: &PgRow) -> ServiceRequest {
    ServiceRequest {
        id: row.get("id"),
        client_id: row.get("client_id"),
        provider_id: row.get("provider_id"),
        category: row.get("category"),
        title: row.get("title"),
        description: row.get("description"),
        status: row.get("status"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        address: row.get("address"),
        budget_min: row.get("budget_min"),
        budget_max: row.get("budget_max"),
        final_price: row.get("final_price"),
        estimated_duration: row.get("estimated_duration"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// A request can only be claimed while still in its initial state.
#[must_use]
pub fn accept_allowed(status: ServiceStatus) -> bool {
    status == ServiceStatus::Requested
}

/// Mean value per completed service; zero before the first completion.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_service_value(total_earnings: f64, total_services: i64) -> f64 {
    if total_services == 0 {
        return 0.0;
    }
    total_earnings / total_services as f64
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create a request on behalf of a client.
///
/// # Errors
///
/// `Forbidden` for providers, or a database error.
pub async fn create(pool: &PgPool, user: &User, input: CreateRequestInput) -> Result<ServiceRequest, RequestError> {
    if user.role != UserRole::Client {
        return Err(RequestError::Forbidden);
    }

    let row = sqlx::query(&format!(
        "INSERT INTO service_requests
             (client_id, category, title, description, latitude, longitude, address,
              budget_min, budget_max, estimated_duration)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(user.id)
    .bind(&input.category)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.latitude)
    .bind(input.longitude)
    .bind(&input.address)
    .bind(input.budget_min)
    .bind(input.budget_max)
    .bind(input.estimated_duration)
    .fetch_one(pool)
    .await?;

    let request = map_request(&row);
    info!(request_id = %request.id, client_id = %user.id, category = %request.category, "service request created");
    Ok(request)
}

/// List the requests visible to `user`: clients see their own, providers
/// see everything still open for matching.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_for(pool: &PgPool, user: &User) -> Result<Vec<ServiceRequest>, RequestError> {
    let rows = match user.role {
        UserRole::Client => {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM service_requests
                 WHERE client_id = $1 ORDER BY created_at DESC"
            ))
            .bind(user.id)
            .fetch_all(pool)
            .await?
        }
        UserRole::Provider => {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM service_requests
                 WHERE status IN ('requested', 'matched') ORDER BY created_at DESC"
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.iter().map(map_request).collect())
}

/// Fetch a request by id.
///
/// # Errors
///
/// `NotFound` if no such request, or a database error.
pub async fn fetch(pool: &PgPool, request_id: Uuid) -> Result<ServiceRequest, RequestError> {
    let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = $1"))
        .bind(request_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_request).ok_or(RequestError::NotFound(request_id))
}

/// Accept a request as a provider: assigns the provider, moves the request
/// to `accepted`, and marks the provider's pending offer (if any) accepted.
///
/// First-wins: the UPDATE is guarded on `status = 'requested'`, so a
/// concurrent second accept sees zero rows and reports a conflict.
///
/// # Errors
///
/// `Forbidden` for non-providers, `NotFound` for an unknown id, `Conflict`
/// when the request was already claimed, or a database error.
pub async fn accept(pool: &PgPool, request_id: Uuid, provider: &User) -> Result<ServiceRequest, RequestError> {
    if provider.role != UserRole::Provider {
        return Err(RequestError::Forbidden);
    }

    let row = sqlx::query(&format!(
        "UPDATE service_requests
         SET provider_id = $2, status = 'accepted', updated_at = now()
         WHERE id = $1 AND status = 'requested'
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(request_id)
    .bind(provider.id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        // Distinguish "gone" from "already claimed".
        fetch(pool, request_id).await?;
        return Err(RequestError::Conflict);
    };

    sqlx::query(
        "UPDATE offers SET status = 'accepted'
         WHERE service_request_id = $1 AND provider_id = $2 AND status = 'pending'",
    )
    .bind(request_id)
    .bind(provider.id)
    .execute(pool)
    .await?;

    let request = map_request(&row);
    info!(request_id = %request.id, provider_id = %provider.id, "service request accepted");
    Ok(request)
}

/// The provider-facing feed of open requests, newest first, capped at 20.
/// No geographic filtering is applied; every `requested` entry qualifies.
///
/// # Errors
///
/// `Forbidden` for non-providers, or a database error.
pub async fn nearby_for(pool: &PgPool, provider: &User) -> Result<Vec<NearbyRequest>, RequestError> {
    if provider.role != UserRole::Provider {
        return Err(RequestError::Forbidden);
    }

    let rows = sqlx::query(
        "SELECT r.id, r.category, r.title, r.description, r.latitude, r.longitude, r.address,
                r.budget_min, r.budget_max, r.estimated_duration, r.created_at,
                u.name AS client_name
         FROM service_requests r
         JOIN users u ON u.id = r.client_id
         WHERE r.status = 'requested'
         ORDER BY r.created_at DESC
         LIMIT $1",
    )
    .bind(NEARBY_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| NearbyRequest {
            id: row.get("id"),
            category: row.get("category"),
            title: row.get("title"),
            description: row.get("description"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            address: row.get("address"),
            budget_min: row.get("budget_min"),
            budget_max: row.get("budget_max"),
            estimated_duration: row.get("estimated_duration"),
            client_name: row.get("client_name"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Earnings totals for a provider. A completed request counts its final
/// price, falling back to the budget ceiling when none was recorded; the
/// monthly slice covers completions since the start of the calendar month.
///
/// # Errors
///
/// `Forbidden` for non-providers, or a database error.
pub async fn earnings_for(pool: &PgPool, provider: &User) -> Result<EarningsSummary, RequestError> {
    if provider.role != UserRole::Provider {
        return Err(RequestError::Forbidden);
    }

    let row = sqlx::query(
        "SELECT COUNT(*) AS total_services,
                COALESCE(SUM(COALESCE(final_price, budget_max, 0)), 0) AS total_earnings,
                COUNT(*) FILTER (WHERE completed_at >= date_trunc('month', now()))
                    AS monthly_services,
                COALESCE(SUM(COALESCE(final_price, budget_max, 0))
                    FILTER (WHERE completed_at >= date_trunc('month', now())), 0)
                    AS monthly_earnings
         FROM service_requests
         WHERE provider_id = $1 AND status = 'completed'",
    )
    .bind(provider.id)
    .fetch_one(pool)
    .await?;

    let total_services: i64 = row.get("total_services");
    let total_earnings: f64 = row.get("total_earnings");
    Ok(EarningsSummary {
        total_earnings,
        total_services,
        monthly_earnings: row.get("monthly_earnings"),
        monthly_services: row.get("monthly_services"),
        average_service_value: average_service_value(total_earnings, total_services),
        provider_rating: provider.rating,
    })
}

/// Record a provider's rejection. The request itself is untouched so other
/// providers can still accept it.
///
/// # Errors
///
/// `NotFound` if the request does not exist, or a database error.
pub async fn reject(pool: &PgPool, request_id: Uuid, provider: &User, input: RejectInput) -> Result<(), RequestError> {
    fetch(pool, request_id).await?;

    sqlx::query(
        "INSERT INTO service_rejections (service_request_id, provider_id, reason)
         VALUES ($1, $2, COALESCE($3, 'provider_declined'))",
    )
    .bind(request_id)
    .bind(provider.id)
    .bind(&input.reason)
    .execute(pool)
    .await?;

    info!(%request_id, provider_id = %provider.id, "service request rejected");
    Ok(())
}

/// Move a request to a new status. Only the client or the assigned provider
/// may do this; `in_progress` stamps `started_at` and `completed` stamps
/// `completed_at`.
///
/// # Errors
///
/// `NotFound`, `Forbidden` for non-participants, or a database error.
pub async fn update_status(
    pool: &PgPool,
    request_id: Uuid,
    user: &User,
    input: StatusUpdateInput,
) -> Result<ServiceRequest, RequestError> {
    let request = fetch(pool, request_id).await?;
    if !request.is_participant(user.id) {
        return Err(RequestError::Forbidden);
    }

    let row = sqlx::query(&format!(
        "UPDATE service_requests
         SET status = $2,
             final_price = COALESCE($3, final_price),
             started_at = CASE WHEN $2 = 'in_progress'::service_status AND started_at IS NULL
                               THEN now() ELSE started_at END,
             completed_at = CASE WHEN $2 = 'completed'::service_status AND completed_at IS NULL
                                 THEN now() ELSE completed_at END,
             updated_at = now()
         WHERE id = $1
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(request_id)
    .bind(input.status)
    .bind(input.final_price)
    .fetch_one(pool)
    .await?;

    let request = map_request(&row);
    info!(%request_id, status = request.status.as_str(), user_id = %user.id, "service request status updated");
    Ok(request)
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
