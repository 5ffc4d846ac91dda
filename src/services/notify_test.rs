use super::*;

// =============================================================================
// previews
// =============================================================================

#[test]
fn short_chat_content_passes_through() {
    assert_eq!(chat_preview("on my way"), "on my way");
    assert_eq!(chat_preview(""), "");
    let exactly_fifty = "x".repeat(50);
    assert_eq!(chat_preview(&exactly_fifty), exactly_fifty);
}

#[test]
fn long_chat_content_is_truncated_with_ellipsis() {
    let long = "a".repeat(80);
    let preview = chat_preview(&long);
    assert_eq!(preview, format!("{}...", "a".repeat(50)));
}

#[test]
fn truncation_counts_characters_not_bytes() {
    // 60 multi-byte characters; byte-indexed slicing would panic or split
    // a code point.
    let long = "ã".repeat(60);
    let preview = chat_preview(&long);
    assert_eq!(preview.chars().count(), 53);
    assert!(preview.ends_with("..."));
}

// =============================================================================
// message shape
// =============================================================================

#[test]
fn push_message_serializes_expo_fields() {
    let message = PushMessage::new(
        "ExponentPushToken[abc]".to_string(),
        "Nova oferta recebida",
        "Você recebeu uma oferta de R$ 100.00",
        serde_json::json!({ "type": "offer_received" }),
    );
    let value = serde_json::to_value(&message).unwrap();

    assert_eq!(value["to"], "ExponentPushToken[abc]");
    assert_eq!(value["title"], "Nova oferta recebida");
    assert_eq!(value["sound"], "default");
    assert_eq!(value["data"]["type"], "offer_received");
}

// =============================================================================
// failure semantics
// =============================================================================

#[tokio::test]
async fn send_to_unreachable_gateway_is_swallowed() {
    // Port 9 (discard) refuses connections; the call must not error or panic.
    let push = PushConfig::test_config();
    let message = PushMessage::new(
        "ExponentPushToken[dead]".to_string(),
        "t",
        "b",
        serde_json::json!({}),
    );
    send(&push, message).await;
}

#[tokio::test]
async fn send_to_user_without_reachable_db_is_swallowed() {
    // Lazy pool: the token lookup fails, which must degrade to a skip.
    let state = crate::state::test_helpers::test_app_state();
    send_to_user(
        &state.pool,
        &state.push,
        uuid::Uuid::new_v4(),
        "t",
        "b",
        serde_json::json!({}),
    )
    .await;
}
