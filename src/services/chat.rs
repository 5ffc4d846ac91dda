//! Chat service — per-request message threads.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Message, User};
use crate::services::request::{self, RequestError};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("service request not found: {0}")]
    RequestNotFound(Uuid),
    #[error("user is not a participant of this request")]
    Forbidden,
    #[error("message content is empty")]
    EmptyMessage,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, serde::Deserialize)]
pub struct SendMessageInput {
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "text".to_owned()
}

fn map_message(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        service_request_id: row.get("service_request_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        message_type: row.get("message_type"),
        created_at: row.get("created_at"),
        read_at: row.get("read_at"),
    }
}

async fn participant_request(pool: &PgPool, request_id: Uuid, user: &User) -> Result<crate::models::ServiceRequest, ChatError> {
    let req = request::fetch(pool, request_id).await.map_err(|e| match e {
        RequestError::NotFound(id) => ChatError::RequestNotFound(id),
        RequestError::Db(e) => ChatError::Db(e),
        RequestError::Forbidden | RequestError::Conflict => ChatError::Forbidden,
    })?;
    if !req.is_participant(user.id) {
        return Err(ChatError::Forbidden);
    }
    Ok(req)
}

/// Append a message to a request's thread. Returns the stored message and
/// the counterparty (if one is assigned) so the caller can relay it.
///
/// # Errors
///
/// `EmptyMessage` for blank content, `RequestNotFound`, `Forbidden` for
/// non-participants, or a database error.
pub async fn send(
    pool: &PgPool,
    request_id: Uuid,
    sender: &User,
    input: SendMessageInput,
) -> Result<(Message, Option<Uuid>), ChatError> {
    if input.content.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let req = participant_request(pool, request_id, sender).await?;

    let row = sqlx::query(
        "INSERT INTO messages (service_request_id, sender_id, content, message_type)
         VALUES ($1, $2, $3, $4)
         RETURNING id, service_request_id, sender_id, content, message_type, created_at, read_at",
    )
    .bind(request_id)
    .bind(sender.id)
    .bind(&input.content)
    .bind(&input.message_type)
    .fetch_one(pool)
    .await?;

    Ok((map_message(&row), req.counterparty(sender.id)))
}

/// A request's message thread, oldest first. Participants only.
///
/// # Errors
///
/// `RequestNotFound`, `Forbidden` for non-participants, or a database error.
pub async fn list(pool: &PgPool, request_id: Uuid, user: &User) -> Result<Vec<Message>, ChatError> {
    participant_request(pool, request_id, user).await?;

    let rows = sqlx::query(
        "SELECT id, service_request_id, sender_id, content, message_type, created_at, read_at
         FROM messages WHERE service_request_id = $1 ORDER BY created_at ASC",
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_message).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_defaults_to_text() {
        let input: SendMessageInput = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(input.message_type, "text");

        let input: SendMessageInput =
            serde_json::from_str(r#"{"content":"pin","message_type":"location"}"#).unwrap();
        assert_eq!(input.message_type, "location");
    }

    #[tokio::test]
    async fn blank_content_is_rejected_before_any_query() {
        let state = crate::state::test_helpers::test_app_state();
        let sender = crate::models::User {
            id: Uuid::new_v4(),
            email: "test@login.com".into(),
            name: "Test".into(),
            role: crate::models::UserRole::Client,
            phone: None,
            avatar: None,
            categories: None,
            rating: None,
            is_online: false,
            latitude: None,
            longitude: None,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
            updated_at: time::OffsetDateTime::UNIX_EPOCH,
        };

        for content in ["", "   ", "\n\t"] {
            let result = send(
                &state.pool,
                Uuid::new_v4(),
                &sender,
                SendMessageInput { content: content.into(), message_type: "text".into() },
            )
            .await;
            assert!(matches!(result, Err(ChatError::EmptyMessage)));
        }
    }
}
