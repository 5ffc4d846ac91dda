//! Notification service — push delivery via an Expo-style gateway.
//!
//! DESIGN
//! ======
//! Push is strictly best-effort. Every failure (missing token, HTTP error,
//! gateway rejection) is logged at warn level and swallowed; no caller ever
//! sees a push failure. One token per user, last write wins.

use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::User;

/// Chat previews in push bodies are cut to this many characters.
const CHAT_PREVIEW_CHARS: usize = 50;

// =============================================================================
// CONFIG
// =============================================================================

/// Push gateway handle: shared HTTP client plus the gateway endpoint.
pub struct PushConfig {
    pub http: reqwest::Client,
    pub endpoint: String,
}

impl PushConfig {
    /// Build from the environment. `EXPO_PUSH_URL` overrides the default
    /// Expo gateway.
    #[must_use]
    pub fn from_env() -> Self {
        let endpoint = std::env::var("EXPO_PUSH_URL")
            .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/send".to_string());
        Self { http: reqwest::Client::new(), endpoint }
    }

    #[cfg(test)]
    #[must_use]
    pub fn test_config() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "http://localhost:9/push".to_string(),
        }
    }
}

/// Expo push message shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub sound: &'static str,
    pub data: serde_json::Value,
}

impl PushMessage {
    #[must_use]
    pub fn new(to: String, title: impl Into<String>, body: impl Into<String>, data: serde_json::Value) -> Self {
        Self { to, title: title.into(), body: body.into(), sound: "default", data }
    }
}

/// Truncate a chat message for the push body.
#[must_use]
pub fn chat_preview(content: &str) -> String {
    if content.chars().count() <= CHAT_PREVIEW_CHARS {
        return content.to_owned();
    }
    let cut: String = content.chars().take(CHAT_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

// =============================================================================
// TOKENS
// =============================================================================

/// Upsert a user's push token. One token per user, last write wins.
///
/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn store_token(pool: &PgPool, user_id: Uuid, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO push_tokens (user_id, token) VALUES ($1, $2)
         ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, updated_at = now()",
    )
    .bind(user_id)
    .bind(token)
    .execute(pool)
    .await?;
    info!(%user_id, "push token stored");
    Ok(())
}

async fn token_for(pool: &PgPool, user_id: Uuid) -> Option<String> {
    let result: Result<Option<String>, _> =
        sqlx::query_scalar("SELECT token FROM push_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await;
    match result {
        Ok(token) => token,
        Err(e) => {
            warn!(%user_id, error = %e, "push token lookup failed");
            None
        }
    }
}

// =============================================================================
// DELIVERY
// =============================================================================

/// POST one message to the gateway. Failures are logged and swallowed.
pub async fn send(push: &PushConfig, message: PushMessage) {
    let to = message.to.clone();
    match push.http.post(&push.endpoint).json(&message).send().await {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            warn!(%to, status = %response.status(), "push gateway rejected message");
        }
        Err(e) => {
            warn!(%to, error = %e, "push delivery failed");
        }
    }
}

/// Look up the user's token and send. Users without a token are silently
/// skipped.
pub async fn send_to_user(
    pool: &PgPool,
    push: &PushConfig,
    user_id: Uuid,
    title: impl Into<String>,
    body: impl Into<String>,
    data: serde_json::Value,
) {
    let Some(token) = token_for(pool, user_id).await else {
        return;
    };
    send(push, PushMessage::new(token, title, body, data)).await;
}

// =============================================================================
// DOMAIN NOTIFICATIONS
// =============================================================================

/// New request posted: ping every online provider with a token.
pub async fn notify_new_request(pool: &PgPool, push: &PushConfig, request_id: Uuid, category: &str, title: &str) {
    let providers: Vec<Uuid> = match sqlx::query_scalar(
        "SELECT id FROM users WHERE role = 'provider' AND is_online = TRUE",
    )
    .fetch_all(pool)
    .await
    {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "provider lookup for push failed");
            return;
        }
    };

    for provider_id in providers {
        send_to_user(
            pool,
            push,
            provider_id,
            "Nova solicitação de serviço",
            format!("{category}: {title}"),
            json!({ "type": "new_service_request", "service_id": request_id }),
        )
        .await;
    }
}

/// A provider made an offer on the client's request.
pub async fn notify_offer_received(pool: &PgPool, push: &PushConfig, client_id: Uuid, request_id: Uuid, price: f64) {
    send_to_user(
        pool,
        push,
        client_id,
        "Nova oferta recebida",
        format!("Você recebeu uma oferta de R$ {price:.2}"),
        json!({ "type": "offer_received", "service_id": request_id }),
    )
    .await;
}

/// A provider accepted the request: tell both parties.
pub async fn notify_service_confirmed(pool: &PgPool, push: &PushConfig, client_id: Uuid, provider_id: Uuid, request_id: Uuid) {
    let data = json!({ "type": "service_confirmed", "service_id": request_id });
    send_to_user(
        pool,
        push,
        client_id,
        "Serviço confirmado",
        "Um prestador aceitou sua solicitação",
        data.clone(),
    )
    .await;
    send_to_user(
        pool,
        push,
        provider_id,
        "Serviço confirmado",
        "Você aceitou a solicitação",
        data,
    )
    .await;
}

/// Service finished: tell both parties.
pub async fn notify_service_completed(pool: &PgPool, push: &PushConfig, client_id: Uuid, provider_id: Uuid, request_id: Uuid) {
    let data = json!({ "type": "service_completed", "service_id": request_id });
    for user_id in [client_id, provider_id] {
        send_to_user(
            pool,
            push,
            user_id,
            "Serviço concluído",
            "O serviço foi marcado como concluído",
            data.clone(),
        )
        .await;
    }
}

/// Chat message push with a truncated preview.
pub async fn notify_chat_message(
    pool: &PgPool,
    push: &PushConfig,
    receiver_id: Uuid,
    sender_name: &str,
    content: &str,
    request_id: Uuid,
) {
    send_to_user(
        pool,
        push,
        receiver_id,
        sender_name,
        chat_preview(content),
        json!({ "type": "chat_message", "service_id": request_id }),
    )
    .await;
}

/// Checkout settled: confirm to the paying user.
pub async fn notify_payment_received(pool: &PgPool, push: &PushConfig, user_id: Uuid, amount: f64) {
    send_to_user(
        pool,
        push,
        user_id,
        "Pagamento recebido",
        format!("Seu pagamento de R$ {amount:.2} foi confirmado"),
        json!({ "type": "payment_received" }),
    )
    .await;
}

/// Fire a test push at the caller (exercised by the notifications route).
pub async fn notify_test(pool: &PgPool, push: &PushConfig, user: &User) {
    send_to_user(
        pool,
        push,
        user.id,
        "Notificação de teste",
        format!("Olá, {}! Suas notificações estão funcionando.", user.name),
        json!({ "type": "test" }),
    )
    .await;
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
