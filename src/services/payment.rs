//! Payment service — Stripe Checkout sessions and the local ledger.
//!
//! DESIGN
//! ======
//! Prices live server-side in a fixed package table; client-supplied amounts
//! are never trusted. Every checkout session gets a local ledger row keyed
//! by the remote session id. Status reconciliation (polling and webhook)
//! funnels through one idempotent update: once a row reads `paid` it never
//! changes again, so replayed webhooks and repeated polls are no-ops.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::PaymentTransaction;
use crate::services::notify::{self, PushConfig};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    #[error("payment session not found: {0}")]
    SessionNotFound(String),
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error("malformed webhook payload")]
    InvalidPayload,
    #[error("payment gateway error: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("payment gateway returned an unusable response")]
    GatewayResponse,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

// =============================================================================
// CONFIG & PACKAGES
// =============================================================================

/// Stripe REST handle.
pub struct StripeConfig {
    pub http: reqwest::Client,
    pub api_key: String,
    pub webhook_secret: String,
    pub base_url: String,
}

impl StripeConfig {
    #[must_use]
    pub fn new(api_key: String, webhook_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            webhook_secret,
            base_url: "https://api.stripe.com".to_string(),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn test_config() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: "sk_test_dummy".to_string(),
            webhook_secret: "whsec_test".to_string(),
            base_url: "http://localhost:9".to_string(),
        }
    }
}

/// A purchasable package. Amounts are in whole currency units.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Package {
    pub id: &'static str,
    pub name: &'static str,
    pub amount: f64,
    pub currency: &'static str,
}

/// Server-side price table. The only source of truth for amounts.
pub const PACKAGES: [Package; 3] = [
    Package { id: "service_basic", name: "Serviço Básico", amount: 50.0, currency: "brl" },
    Package { id: "service_premium", name: "Serviço Premium", amount: 150.0, currency: "brl" },
    Package { id: "service_deluxe", name: "Serviço Deluxe", amount: 300.0, currency: "brl" },
];

/// Look up a package by id.
#[must_use]
pub fn package(package_id: &str) -> Option<&'static Package> {
    PACKAGES.iter().find(|p| p.id == package_id)
}

/// Stripe wants amounts in the currency's minor unit.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn amount_in_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

// =============================================================================
// LEDGER
// =============================================================================

fn map_transaction(row: &PgRow) -> PaymentTransaction {
    PaymentTransaction {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        package_id: row.get("package_id"),
        status: row.get("status"),
        payment_status: row.get("payment_status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Whether a settlement update may still be applied. Paid rows are final.
#[must_use]
pub fn settlement_allowed(current_payment_status: &str) -> bool {
    current_payment_status != "paid"
}

/// Fetch a ledger row.
///
/// # Errors
///
/// `SessionNotFound` or a database error.
pub async fn fetch_transaction(pool: &PgPool, session_id: &str) -> Result<PaymentTransaction, PaymentError> {
    let row = sqlx::query(
        "SELECT session_id, user_id, amount, currency, package_id, status, payment_status,
                created_at, updated_at
         FROM payment_transactions WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref()
        .map(map_transaction)
        .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_owned()))
}

/// Apply a reconciled status to the ledger. The UPDATE is guarded on
/// `payment_status <> 'paid'`, making replays no-ops. The returned flag is
/// true only when this call actually changed the row, so callers can fire
/// one-shot side effects without re-triggering them on replay.
///
/// # Errors
///
/// `SessionNotFound` or a database error.
pub async fn apply_settlement(
    pool: &PgPool,
    session_id: &str,
    status: &str,
    payment_status: &str,
) -> Result<(PaymentTransaction, bool), PaymentError> {
    let updated = sqlx::query(
        "UPDATE payment_transactions
         SET status = $2, payment_status = $3, updated_at = now()
         WHERE session_id = $1 AND payment_status <> 'paid'",
    )
    .bind(session_id)
    .bind(status)
    .bind(payment_status)
    .execute(pool)
    .await?;

    let newly_applied = updated.rows_affected() > 0;
    if newly_applied && payment_status == "paid" {
        info!(%session_id, "payment settled");
    }

    let transaction = fetch_transaction(pool, session_id).await?;
    Ok((transaction, newly_applied))
}

// =============================================================================
// CHECKOUT
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutInput {
    pub package_id: String,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Response body for session creation.
#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

/// Create a Checkout Session for a fixed package and open a ledger row.
///
/// # Errors
///
/// `UnknownPackage`, a gateway error (502 at the route layer), or a
/// database error.
pub async fn create_checkout(
    pool: &PgPool,
    stripe: &StripeConfig,
    user_id: Uuid,
    input: CheckoutInput,
) -> Result<CheckoutSession, PaymentError> {
    let package = package(&input.package_id).ok_or_else(|| PaymentError::UnknownPackage(input.package_id.clone()))?;

    let success_url = input
        .success_url
        .unwrap_or_else(|| "servimatch://payment/success".to_string());
    let cancel_url = input
        .cancel_url
        .unwrap_or_else(|| "servimatch://payment/cancel".to_string());
    let unit_amount = amount_in_cents(package.amount).to_string();

    let form = [
        ("mode", "payment"),
        ("payment_method_types[0]", "card"),
        ("line_items[0][quantity]", "1"),
        ("line_items[0][price_data][currency]", package.currency),
        ("line_items[0][price_data][product_data][name]", package.name),
        ("line_items[0][price_data][unit_amount]", unit_amount.as_str()),
        ("success_url", success_url.as_str()),
        ("cancel_url", cancel_url.as_str()),
        ("metadata[user_id]", &user_id.to_string()),
        ("metadata[package_id]", package.id),
    ];

    let response = stripe
        .http
        .post(format!("{}/v1/checkout/sessions", stripe.base_url))
        .bearer_auth(&stripe.api_key)
        .form(&form)
        .send()
        .await?;

    if !response.status().is_success() {
        warn!(status = %response.status(), "checkout session creation rejected");
        return Err(PaymentError::GatewayResponse);
    }
    let session: StripeSession = response.json().await?;
    let url = session.url.ok_or(PaymentError::GatewayResponse)?;

    sqlx::query(
        "INSERT INTO payment_transactions (session_id, user_id, amount, currency, package_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&session.id)
    .bind(user_id)
    .bind(package.amount)
    .bind(package.currency)
    .bind(package.id)
    .execute(pool)
    .await?;

    info!(session_id = %session.id, %user_id, package_id = package.id, "checkout session created");
    Ok(CheckoutSession {
        session_id: session.id,
        url,
        amount: package.amount,
        currency: package.currency.to_owned(),
    })
}

/// Poll Stripe for a session's state and reconcile the ledger.
///
/// # Errors
///
/// `SessionNotFound` for an unknown ledger row, a gateway error, or a
/// database error.
pub async fn checkout_status(
    pool: &PgPool,
    stripe: &StripeConfig,
    session_id: &str,
) -> Result<PaymentTransaction, PaymentError> {
    // The row must exist locally before we bother the gateway.
    fetch_transaction(pool, session_id).await?;

    let response = stripe
        .http
        .get(format!("{}/v1/checkout/sessions/{session_id}", stripe.base_url))
        .bearer_auth(&stripe.api_key)
        .send()
        .await?;
    if !response.status().is_success() {
        warn!(status = %response.status(), %session_id, "checkout session lookup rejected");
        return Err(PaymentError::GatewayResponse);
    }
    let session: StripeSession = response.json().await?;

    let status = session.status.as_deref().unwrap_or("unknown");
    let payment_status = session.payment_status.as_deref().unwrap_or("unpaid");
    let (transaction, _) = apply_settlement(pool, session_id, status, payment_status).await?;
    Ok(transaction)
}

// =============================================================================
// WEBHOOK
// =============================================================================

/// Parsed `Stripe-Signature` header: the timestamp and the v1 signatures.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: String,
    pub signatures: Vec<String>,
}

/// Parse `t=...,v1=...` (possibly repeated v1 entries).
#[must_use]
pub fn parse_signature_header(header: &str) -> Option<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key {
            "t" => timestamp = Some(value.to_owned()),
            "v1" => signatures.push(value.to_owned()),
            _ => {}
        }
    }
    let timestamp = timestamp?;
    if signatures.is_empty() {
        return None;
    }
    Some(SignatureHeader { timestamp, signatures })
}

fn expected_signature(secret: &str, timestamp: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Verify a webhook payload against its `Stripe-Signature` header.
#[must_use]
pub fn verify_signature(secret: &str, payload: &str, header: &str) -> bool {
    let Some(parsed) = parse_signature_header(header) else {
        return false;
    };
    let expected = expected_signature(secret, &parsed.timestamp, payload);
    parsed.signatures.iter().any(|sig| {
        // Byte-wise comparison over fixed-length hex; length mismatch fails fast.
        sig.len() == expected.len()
            && sig
                .bytes()
                .zip(expected.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    })
}

/// Handle a verified webhook delivery: on `checkout.session.completed`,
/// reconcile the ledger and, when the row first reaches `paid`, push a
/// confirmation to the paying user. Other event types are acknowledged and
/// ignored; so are replays, since the settlement guard reports them as
/// no-ops.
///
/// # Errors
///
/// `InvalidSignature`, `InvalidPayload`, or a database error. An unknown
/// session id is logged and ignored (Stripe retries otherwise).
pub async fn handle_webhook(
    pool: &PgPool,
    stripe: &StripeConfig,
    push: &PushConfig,
    payload: &str,
    signature: &str,
) -> Result<(), PaymentError> {
    if !verify_signature(&stripe.webhook_secret, payload, signature) {
        return Err(PaymentError::InvalidSignature);
    }

    let event: serde_json::Value = serde_json::from_str(payload).map_err(|_| PaymentError::InvalidPayload)?;
    let event_type = event["type"].as_str().unwrap_or_default();
    if event_type != "checkout.session.completed" {
        return Ok(());
    }

    let object = &event["data"]["object"];
    let session_id = object["id"].as_str().ok_or(PaymentError::InvalidPayload)?;
    let payment_status = object["payment_status"].as_str().unwrap_or("paid");

    match apply_settlement(pool, session_id, "complete", payment_status).await {
        Ok((transaction, newly_applied)) => {
            if newly_applied && transaction.payment_status == "paid" {
                notify::notify_payment_received(pool, push, transaction.user_id, transaction.amount).await;
            }
            Ok(())
        }
        Err(PaymentError::SessionNotFound(id)) => {
            warn!(session_id = %id, "webhook for unknown session ignored");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "payment_test.rs"]
mod tests;
