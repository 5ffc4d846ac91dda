//! User routes — profile, location, role switching, provider status.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::error;

use super::auth::AuthUser;
use crate::event::{self, ServerEvent};
use crate::models::{GeoPoint, User, UserRole};
use crate::services::realtime;
use crate::services::user::{self, ProfileUpdate, UserError};
use crate::state::AppState;

/// `GET /api/users/me` — the caller's own profile.
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// `PUT /api/users/profile` — partial profile update.
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, StatusCode> {
    let user = user::update_profile(&state.pool, auth.user.id, update)
        .await
        .map_err(user_error_to_status)?;
    Ok(Json(user))
}

/// `POST /api/users/location` — store the caller's last position.
pub async fn update_location(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(location): Json<GeoPoint>,
) -> Result<StatusCode, StatusCode> {
    user::update_location(&state.pool, auth.user.id, location)
        .await
        .map_err(|e| {
            error!(error = %e, "location update failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct RoleSwitchResponse {
    pub role: UserRole,
}

/// `POST /api/users/role-switch` — flip between client and provider.
pub async fn switch_role(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<RoleSwitchResponse>, StatusCode> {
    let role = user::switch_role(&state.pool, &auth.user)
        .await
        .map_err(user_error_to_status)?;
    Ok(Json(RoleSwitchResponse { role }))
}

#[derive(Serialize)]
pub struct ToggleStatusResponse {
    pub is_online: bool,
}

/// `PUT /api/providers/toggle-status` — flip the provider's online flag and
/// announce the change to connected users.
pub async fn toggle_provider_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ToggleStatusResponse>, StatusCode> {
    let is_online = user::toggle_provider_status(&state.pool, &auth.user)
        .await
        .map_err(user_error_to_status)?;

    let event = ServerEvent::ProviderStatusChange {
        provider_id: auth.user.id,
        is_online,
        timestamp: event::now(),
    };
    realtime::broadcast_to_providers(&state, &event, Some(auth.user.id)).await;

    Ok(Json(ToggleStatusResponse { is_online }))
}

pub(crate) fn user_error_to_status(e: UserError) -> StatusCode {
    match e {
        UserError::NotFound(_) => StatusCode::NOT_FOUND,
        UserError::Forbidden => StatusCode::FORBIDDEN,
        UserError::Db(e) => {
            error!(error = %e, "user database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
