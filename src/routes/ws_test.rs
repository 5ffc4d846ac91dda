use super::*;
use crate::models::ServiceStatus;
use crate::state::test_helpers::{connect_user, seed_active_service, test_app_state};
use tokio::time::{Duration, timeout};
use uuid::Uuid;

fn make_user(role: UserRole) -> User {
    User {
        id: Uuid::new_v4(),
        email: "test@login.com".into(),
        name: "Test".into(),
        role,
        phone: None,
        avatar: None,
        categories: None,
        rating: None,
        is_online: false,
        latitude: None,
        longitude: None,
        created_at: time::OffsetDateTime::UNIX_EPOCH,
        updated_at: time::OffsetDateTime::UNIX_EPOCH,
    }
}

async fn recv_event(rx: &mut tokio::sync::mpsc::Receiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("channel closed")
}

#[tokio::test]
async fn unparseable_input_replies_with_error_to_sender_only() {
    let state = test_app_state();
    let sender = make_user(UserRole::Client);
    let mut other_rx = connect_user(&state, Uuid::new_v4()).await;

    let reply = process_inbound_event(&state, &sender, "not json").await;
    assert!(matches!(reply, Some(ServerEvent::Error { .. })));

    let reply = process_inbound_event(&state, &sender, r#"{"type":"nonsense"}"#).await;
    assert!(matches!(reply, Some(ServerEvent::Error { .. })));

    assert!(
        timeout(Duration::from_millis(80), other_rx.recv()).await.is_err(),
        "errors must not be broadcast"
    );
}

#[tokio::test]
async fn location_update_relays_despite_persistence_failure() {
    // The lazy pool cannot reach a database, so the write fails; the
    // registry fan-out must still happen.
    let state = test_app_state();
    let provider = make_user(UserRole::Provider);
    let client_id = Uuid::new_v4();
    let mut client_rx = connect_user(&state, client_id).await;
    seed_active_service(&state, client_id, Some(provider.id), ServiceStatus::InProgress).await;

    let reply = process_inbound_event(
        &state,
        &provider,
        r#"{"type":"location_update","latitude":-23.55,"longitude":-46.63}"#,
    )
    .await;
    assert!(reply.is_none());

    match recv_event(&mut client_rx).await {
        ServerEvent::LocationUpdate { user_id, latitude, .. } => {
            assert_eq!(user_id, provider.id);
            assert!((latitude - -23.55).abs() < f64::EPSILON);
        }
        other => panic!("expected location update, got {other:?}"),
    }
}

#[tokio::test]
async fn provider_status_broadcasts_to_peers_not_sender() {
    let state = test_app_state();
    let provider = make_user(UserRole::Provider);
    let mut own_rx = connect_user(&state, provider.id).await;
    let mut peer_rx = connect_user(&state, Uuid::new_v4()).await;

    let reply = process_inbound_event(&state, &provider, r#"{"type":"provider_status","is_online":true}"#).await;
    assert!(reply.is_none());

    match recv_event(&mut peer_rx).await {
        ServerEvent::ProviderStatusChange { provider_id, is_online, .. } => {
            assert_eq!(provider_id, provider.id);
            assert!(is_online);
        }
        other => panic!("expected status change, got {other:?}"),
    }
    assert!(
        timeout(Duration::from_millis(80), own_rx.recv()).await.is_err(),
        "sender must be excluded from its own broadcast"
    );
}

#[tokio::test]
async fn provider_status_from_client_is_rejected() {
    let state = test_app_state();
    let client = make_user(UserRole::Client);
    let reply = process_inbound_event(&state, &client, r#"{"type":"provider_status","is_online":true}"#).await;
    assert!(matches!(reply, Some(ServerEvent::Error { .. })));
}

#[tokio::test]
async fn failed_accept_replies_with_error() {
    // No reachable database, so the accept write fails and the sender gets
    // an error event instead of a silent drop.
    let state = test_app_state();
    let provider = make_user(UserRole::Provider);
    let service_id = Uuid::new_v4();

    let raw = format!(r#"{{"type":"service_response","service_id":"{service_id}","response":"accept"}}"#);
    let reply = process_inbound_event(&state, &provider, &raw).await;
    assert!(matches!(reply, Some(ServerEvent::Error { .. })));
}

#[tokio::test]
async fn failed_reject_is_swallowed() {
    let state = test_app_state();
    let provider = make_user(UserRole::Provider);
    let service_id = Uuid::new_v4();

    let raw = format!(r#"{{"type":"service_response","service_id":"{service_id}","response":"reject"}}"#);
    let reply = process_inbound_event(&state, &provider, &raw).await;
    assert!(reply.is_none());
}
