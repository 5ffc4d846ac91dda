//! Payment routes — packages, checkout sessions, webhook.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use tracing::error;

use super::auth::AuthUser;
use crate::models::PaymentTransaction;
use crate::services::payment::{self, CheckoutInput, CheckoutSession, Package, PaymentError, PACKAGES};
use crate::state::AppState;

/// `GET /api/payments/packages` — the fixed price table.
pub async fn list_packages(_auth: AuthUser) -> Json<Vec<Package>> {
    Json(PACKAGES.to_vec())
}

/// `POST /api/payments/checkout/session` — open a checkout session.
pub async fn create_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<CheckoutSession>), StatusCode> {
    let session = payment::create_checkout(&state.pool, &state.stripe, auth.user.id, input)
        .await
        .map_err(payment_error_to_status)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/payments/checkout/status/{session_id}` — poll + reconcile.
pub async fn checkout_status(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentTransaction>, StatusCode> {
    let transaction = payment::checkout_status(&state.pool, &state.stripe, &session_id)
        .await
        .map_err(payment_error_to_status)?;
    Ok(Json(transaction))
}

/// `POST /api/payments/webhook/stripe` — signed gateway callback. No bearer
/// auth; the HMAC signature is the authentication.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: String,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    payment::handle_webhook(&state.pool, &state.stripe, &state.push, &payload, signature)
        .await
        .map_err(payment_error_to_status)?;
    Ok(StatusCode::OK)
}

pub(crate) fn payment_error_to_status(e: PaymentError) -> StatusCode {
    match e {
        PaymentError::UnknownPackage(_) | PaymentError::InvalidPayload => StatusCode::BAD_REQUEST,
        PaymentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::InvalidSignature => StatusCode::UNAUTHORIZED,
        PaymentError::Gateway(e) => {
            error!(error = %e, "payment gateway request failed");
            StatusCode::BAD_GATEWAY
        }
        PaymentError::GatewayResponse => StatusCode::BAD_GATEWAY,
        PaymentError::Db(e) => {
            error!(error = %e, "payment database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_errors_map_to_expected_statuses() {
        assert_eq!(
            payment_error_to_status(PaymentError::UnknownPackage("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            payment_error_to_status(PaymentError::SessionNotFound("cs_1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            payment_error_to_status(PaymentError::InvalidSignature),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            payment_error_to_status(PaymentError::GatewayResponse),
            StatusCode::BAD_GATEWAY
        );
    }
}
