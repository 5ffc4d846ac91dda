//! Notification routes — token registration and a test push.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::error;

use super::auth::AuthUser;
use crate::services::notify;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// `POST /api/notifications/token` — register the caller's push token.
pub async fn store_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<TokenRequest>,
) -> Result<StatusCode, StatusCode> {
    if input.token.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    notify::store_token(&state.pool, auth.user.id, &input.token)
        .await
        .map_err(|e| {
            error!(error = %e, "push token store failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/notifications/test` — fire a test push at the caller.
/// Delivery problems are swallowed, so this always succeeds.
pub async fn send_test(State(state): State<AppState>, auth: AuthUser) -> StatusCode {
    notify::notify_test(&state.pool, &state.push, &auth.user).await;
    StatusCode::ACCEPTED
}
