//! Auth routes — registration, login, and the bearer-token extractor.

use axum::Json;
use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::error;

use crate::models::User;
use crate::services::auth::{self, AuthError, RegisterInput, TokenResponse};
use crate::state::AppState;

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Authenticated request context: the user behind the bearer token.
/// Extracting this in a handler makes the route protected.
pub struct AuthUser {
    pub user: User,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let user = auth::authenticate(&app_state.pool, &app_state.auth, token)
            .await
            .map_err(auth_error_to_status)?;
        Ok(Self { user })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/register` — create an account, return a token + profile.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<TokenResponse>, StatusCode> {
    let response = auth::register(&state.pool, &state.auth, input)
        .await
        .map_err(auth_error_to_status)?;
    Ok(Json(response))
}

/// `POST /api/auth/login` — verify credentials, return a token + profile.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, StatusCode> {
    let response = auth::login(&state.pool, &state.auth, &input.email, &input.password)
        .await
        .map_err(auth_error_to_status)?;
    Ok(Json(response))
}

pub(crate) fn auth_error_to_status(e: AuthError) -> StatusCode {
    match e {
        AuthError::InvalidEmail => StatusCode::BAD_REQUEST,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::IncorrectCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::Hash(e) => {
            error!(error = %e, "password hashing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AuthError::Db(e) => {
            error!(error = %e, "auth database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
