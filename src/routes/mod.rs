//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router binds the whole surface: REST endpoints under `/api`,
//! the websocket upgrade at `/api/ws`, and `/healthz`. Handlers stay thin
//! and delegate to the service layer; the `AuthUser` extractor protects
//! everything except register, login, the webhook, and the health check.

pub mod ai;
pub mod auth;
pub mod notifications;
pub mod payments;
pub mod services;
pub mod users;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/users/me", get(users::me))
        .route("/api/users/profile", put(users::update_profile))
        .route("/api/users/location", post(users::update_location))
        .route("/api/users/role-switch", post(users::switch_role))
        .route("/api/providers/toggle-status", put(users::toggle_provider_status))
        .route("/api/providers/earnings", get(services::provider_earnings))
        .route(
            "/api/services/requests",
            get(services::list_requests).post(services::create_request),
        )
        .route("/api/services/nearby", get(services::nearby_requests))
        .route("/api/services/requests/{id}", get(services::get_request))
        .route("/api/services/requests/{id}/accept", post(services::accept_request))
        .route("/api/services/requests/{id}/reject", post(services::reject_request))
        .route("/api/services/requests/{id}/status", put(services::update_request_status))
        .route(
            "/api/services/requests/{id}/messages",
            get(services::list_messages).post(services::send_message),
        )
        .route(
            "/api/services/offers",
            get(services::list_offers).post(services::create_offer),
        )
        .route(
            "/api/services/reviews",
            get(services::list_reviews).post(services::create_review),
        )
        .route("/api/notifications/token", post(notifications::store_token))
        .route("/api/notifications/test", post(notifications::send_test))
        .route("/api/payments/packages", get(payments::list_packages))
        .route("/api/payments/checkout/session", post(payments::create_checkout))
        .route(
            "/api/payments/checkout/status/{session_id}",
            get(payments::checkout_status),
        )
        .route("/api/payments/webhook/stripe", post(payments::stripe_webhook))
        .route("/api/ai/recommendations", post(ai::recommendations))
        .route("/api/ai/enhance-description", post(ai::enhance_description))
        .route("/api/ai/chat-assistant", post(ai::chat_assistant))
        .route("/api/ai/usage-stats", get(ai::usage_stats))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
