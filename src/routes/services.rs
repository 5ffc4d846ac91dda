//! Marketplace routes — requests, offers, reviews, message threads.
//!
//! Handlers here are orchestration only: persist via the service layer,
//! then fan out the realtime and push side effects. Push is fire-and-forget;
//! realtime delivery failures just mean the peer was offline.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::error;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::event::ServiceSnapshot;
use crate::models::{Message, Offer, Review, ServiceRequest, ServiceStatus};
use crate::services::chat::{self, ChatError, SendMessageInput};
use crate::services::notify;
use crate::services::offer::{self, CreateOfferInput, OfferError};
use crate::services::realtime;
use crate::services::request::{
    self, CreateRequestInput, EarningsSummary, NearbyRequest, RejectInput, RequestError, StatusUpdateInput,
};
use crate::services::review::{self, CreateReviewInput, ReviewError};
use crate::state::AppState;

fn snapshot_of(request: &ServiceRequest) -> ServiceSnapshot {
    ServiceSnapshot {
        id: request.id,
        client_id: request.client_id,
        provider_id: request.provider_id,
        status: request.status,
        category: request.category.clone(),
        title: request.title.clone(),
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// `POST /api/services/requests` — post a new request (clients only).
pub async fn create_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateRequestInput>,
) -> Result<(StatusCode, Json<ServiceRequest>), StatusCode> {
    let request = request::create(&state.pool, &auth.user, input)
        .await
        .map_err(request_error_to_status)?;

    realtime::register_service_request(&state, snapshot_of(&request)).await;
    notify::notify_new_request(&state.pool, &state.push, request.id, &request.category, &request.title).await;

    Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /api/services/requests` — the caller's view of the marketplace.
pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ServiceRequest>>, StatusCode> {
    let requests = request::list_for(&state.pool, &auth.user)
        .await
        .map_err(request_error_to_status)?;
    Ok(Json(requests))
}

/// `GET /api/services/nearby` — open requests for a provider's feed.
pub async fn nearby_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<NearbyRequest>>, StatusCode> {
    let requests = request::nearby_for(&state.pool, &auth.user)
        .await
        .map_err(request_error_to_status)?;
    Ok(Json(requests))
}

/// `GET /api/providers/earnings` — the caller's completed-work totals.
pub async fn provider_earnings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<EarningsSummary>, StatusCode> {
    let summary = request::earnings_for(&state.pool, &auth.user)
        .await
        .map_err(request_error_to_status)?;
    Ok(Json(summary))
}

/// `GET /api/services/requests/{id}`.
pub async fn get_request(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, StatusCode> {
    let request = request::fetch(&state.pool, request_id)
        .await
        .map_err(request_error_to_status)?;
    Ok(Json(request))
}

/// `POST /api/services/requests/{id}/accept` — claim a request (providers).
pub async fn accept_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, StatusCode> {
    let request = request::accept(&state.pool, request_id, &auth.user)
        .await
        .map_err(request_error_to_status)?;

    realtime::update_service_status(&state, request.id, request.status, Some(auth.user.id)).await;
    notify::notify_service_confirmed(&state.pool, &state.push, request.client_id, auth.user.id, request.id).await;

    Ok(Json(request))
}

/// `POST /api/services/requests/{id}/reject` — log a provider's pass.
/// The body is optional; a missing or empty one means no stated reason.
pub async fn reject_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    body: String,
) -> Result<StatusCode, StatusCode> {
    let input: RejectInput = serde_json::from_str(&body).unwrap_or_default();
    request::reject(&state.pool, request_id, &auth.user, input)
        .await
        .map_err(request_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/services/requests/{id}/status` — lifecycle transition by a
/// participant.
pub async fn update_request_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<StatusUpdateInput>,
) -> Result<Json<ServiceRequest>, StatusCode> {
    let request = request::update_status(&state.pool, request_id, &auth.user, input)
        .await
        .map_err(request_error_to_status)?;

    realtime::update_service_status(&state, request.id, request.status, request.provider_id).await;
    if request.status == ServiceStatus::Completed {
        if let Some(provider_id) = request.provider_id {
            notify::notify_service_completed(&state.pool, &state.push, request.client_id, provider_id, request.id)
                .await;
        }
    }

    Ok(Json(request))
}

// =============================================================================
// OFFERS
// =============================================================================

/// `POST /api/services/offers` — bid on a request (providers only).
pub async fn create_offer(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateOfferInput>,
) -> Result<(StatusCode, Json<Offer>), StatusCode> {
    let offer = offer::create(&state.pool, &auth.user, input)
        .await
        .map_err(offer_error_to_status)?;

    // Offer pushes are best-effort; a vanished request just skips them.
    if let Ok(request) = request::fetch(&state.pool, offer.service_request_id).await {
        notify::notify_offer_received(&state.pool, &state.push, request.client_id, request.id, offer.price).await;
    }

    Ok((StatusCode::CREATED, Json(offer)))
}

/// `GET /api/services/offers` — the caller's offers (made or received).
pub async fn list_offers(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Offer>>, StatusCode> {
    let offers = offer::list_for(&state.pool, &auth.user)
        .await
        .map_err(offer_error_to_status)?;
    Ok(Json(offers))
}

// =============================================================================
// REVIEWS
// =============================================================================

/// `POST /api/services/reviews` — review the other party of a request.
pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateReviewInput>,
) -> Result<(StatusCode, Json<Review>), StatusCode> {
    let review = review::create(&state.pool, &auth.user, input)
        .await
        .map_err(review_error_to_status)?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /api/services/reviews` — reviews the caller has received.
pub async fn list_reviews(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Review>>, StatusCode> {
    let reviews = review::list_for_reviewee(&state.pool, auth.user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "review listing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(reviews))
}

// =============================================================================
// MESSAGES
// =============================================================================

/// `POST /api/services/requests/{id}/messages` — append to the thread and
/// relay to the counterparty.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<Message>), StatusCode> {
    let (message, counterparty) = chat::send(&state.pool, request_id, &auth.user, input)
        .await
        .map_err(chat_error_to_status)?;

    if let Some(receiver_id) = counterparty {
        realtime::send_chat_message(&state, auth.user.id, receiver_id, request_id, &message.content).await;
        notify::notify_chat_message(
            &state.pool,
            &state.push,
            receiver_id,
            &auth.user.name,
            &message.content,
            request_id,
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /api/services/requests/{id}/messages` — the thread, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let messages = chat::list(&state.pool, request_id, &auth.user)
        .await
        .map_err(chat_error_to_status)?;
    Ok(Json(messages))
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

pub(crate) fn request_error_to_status(e: RequestError) -> StatusCode {
    match e {
        RequestError::NotFound(_) => StatusCode::NOT_FOUND,
        RequestError::Forbidden => StatusCode::FORBIDDEN,
        RequestError::Conflict => StatusCode::CONFLICT,
        RequestError::Db(e) => {
            error!(error = %e, "service request database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn offer_error_to_status(e: OfferError) -> StatusCode {
    match e {
        OfferError::RequestNotFound(_) => StatusCode::NOT_FOUND,
        OfferError::Forbidden => StatusCode::FORBIDDEN,
        OfferError::Db(e) => {
            error!(error = %e, "offer database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn review_error_to_status(e: ReviewError) -> StatusCode {
    match e {
        ReviewError::RequestNotFound(_) => StatusCode::NOT_FOUND,
        ReviewError::Forbidden | ReviewError::NoReviewee => StatusCode::FORBIDDEN,
        ReviewError::Duplicate => StatusCode::CONFLICT,
        ReviewError::InvalidRating => StatusCode::BAD_REQUEST,
        ReviewError::Db(e) => {
            error!(error = %e, "review database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn chat_error_to_status(e: ChatError) -> StatusCode {
    match e {
        ChatError::RequestNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Forbidden => StatusCode::FORBIDDEN,
        ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
        ChatError::Db(e) => {
            error!(error = %e, "chat database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_errors_map_to_expected_statuses() {
        assert_eq!(
            request_error_to_status(RequestError::NotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(request_error_to_status(RequestError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(request_error_to_status(RequestError::Conflict), StatusCode::CONFLICT);
        assert_eq!(review_error_to_status(ReviewError::Duplicate), StatusCode::CONFLICT);
        assert_eq!(review_error_to_status(ReviewError::InvalidRating), StatusCode::BAD_REQUEST);
        assert_eq!(chat_error_to_status(ChatError::EmptyMessage), StatusCode::BAD_REQUEST);
        assert_eq!(
            offer_error_to_status(OfferError::Forbidden),
            StatusCode::FORBIDDEN
        );
    }
}
