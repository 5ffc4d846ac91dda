use super::*;
use crate::state::test_helpers::{connect_user, seed_active_service, test_app_state};
use tokio::time::{Duration, timeout};

async fn recv_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("channel closed")
}

async fn assert_no_event(rx: &mut mpsc::Receiver<ServerEvent>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected channel to remain empty"
    );
}

// =============================================================================
// connect / disconnect
// =============================================================================

#[tokio::test]
async fn disconnect_drops_connection_and_location() {
    let state = test_app_state();
    let user = Uuid::new_v4();
    let _rx = connect_user(&state, user).await;
    update_location(&state, user, -23.55, -46.63).await;

    assert!(is_connected(&state, user).await);
    assert!(user_location(&state, user).await.is_some());

    disconnect(&state, user).await;
    assert!(!is_connected(&state, user).await);
    assert!(user_location(&state, user).await.is_none());
}

// =============================================================================
// unicast
// =============================================================================

#[tokio::test]
async fn unicast_delivers_to_connected_user() {
    let state = test_app_state();
    let user = Uuid::new_v4();
    let mut rx = connect_user(&state, user).await;

    let delivered = unicast(&state, user, ServerEvent::Connected { user_id: user }).await;
    assert!(delivered);
    assert_eq!(recv_event(&mut rx).await, ServerEvent::Connected { user_id: user });
}

#[tokio::test]
async fn unicast_to_unknown_user_returns_false() {
    let state = test_app_state();
    assert!(!unicast(&state, Uuid::new_v4(), ServerEvent::Connected { user_id: Uuid::new_v4() }).await);
}

#[tokio::test]
async fn unicast_to_dead_channel_evicts_connection() {
    let state = test_app_state();
    let user = Uuid::new_v4();
    let rx = connect_user(&state, user).await;
    drop(rx);

    let delivered = unicast(&state, user, ServerEvent::Connected { user_id: user }).await;
    assert!(!delivered);
    assert!(!is_connected(&state, user).await);
}

// =============================================================================
// broadcast
// =============================================================================

#[tokio::test]
async fn broadcast_reaches_everyone_except_excluded() {
    let state = test_app_state();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let mut rx_a = connect_user(&state, a).await;
    let mut rx_b = connect_user(&state, b).await;
    let mut rx_c = connect_user(&state, c).await;

    let event = ServerEvent::ProviderStatusChange { provider_id: b, is_online: true, timestamp: event::now() };
    let sent = broadcast_to_providers(&state, &event, Some(b)).await;

    assert_eq!(sent, 2);
    assert!(matches!(recv_event(&mut rx_a).await, ServerEvent::ProviderStatusChange { .. }));
    assert!(matches!(recv_event(&mut rx_c).await, ServerEvent::ProviderStatusChange { .. }));
    assert_no_event(&mut rx_b).await;
}

#[tokio::test]
async fn broadcast_send_failure_evicts_without_aborting() {
    let state = test_app_state();
    let alive = Uuid::new_v4();
    let dead = Uuid::new_v4();
    let mut rx_alive = connect_user(&state, alive).await;
    let rx_dead = connect_user(&state, dead).await;
    drop(rx_dead);

    let event = ServerEvent::ProviderStatusChange {
        provider_id: Uuid::new_v4(),
        is_online: false,
        timestamp: event::now(),
    };
    let sent = broadcast_to_providers(&state, &event, None).await;

    assert_eq!(sent, 1);
    assert!(matches!(recv_event(&mut rx_alive).await, ServerEvent::ProviderStatusChange { .. }));
    assert!(!is_connected(&state, dead).await);
}

// =============================================================================
// location fan-out
// =============================================================================

#[tokio::test]
async fn location_update_reaches_exactly_the_counterparties() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let provider = Uuid::new_v4();
    let bystander = Uuid::new_v4();

    let mut rx_client = connect_user(&state, client).await;
    let mut rx_provider = connect_user(&state, provider).await;
    let mut rx_bystander = connect_user(&state, bystander).await;
    seed_active_service(&state, client, Some(provider), ServiceStatus::Accepted).await;

    update_location(&state, provider, -23.55, -46.63).await;

    let received = recv_event(&mut rx_client).await;
    match received {
        ServerEvent::LocationUpdate { user_id, latitude, longitude, .. } => {
            assert_eq!(user_id, provider);
            assert!((latitude - -23.55).abs() < f64::EPSILON);
            assert!((longitude - -46.63).abs() < f64::EPSILON);
        }
        other => panic!("expected location update, got {other:?}"),
    }
    // The sender and uninvolved users hear nothing.
    assert_no_event(&mut rx_provider).await;
    assert_no_event(&mut rx_bystander).await;
}

#[tokio::test]
async fn location_update_with_no_active_services_fans_out_to_nobody() {
    let state = test_app_state();
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    let mut rx_user = connect_user(&state, user).await;
    let mut rx_other = connect_user(&state, other).await;

    update_location(&state, user, 1.0, 2.0).await;

    assert!(user_location(&state, user).await.is_some());
    assert_no_event(&mut rx_user).await;
    assert_no_event(&mut rx_other).await;
}

#[tokio::test]
async fn location_update_covers_every_active_service_of_the_user() {
    let state = test_app_state();
    let client_a = Uuid::new_v4();
    let client_b = Uuid::new_v4();
    let provider = Uuid::new_v4();

    let mut rx_a = connect_user(&state, client_a).await;
    let mut rx_b = connect_user(&state, client_b).await;
    seed_active_service(&state, client_a, Some(provider), ServiceStatus::InProgress).await;
    seed_active_service(&state, client_b, Some(provider), ServiceStatus::Accepted).await;

    update_location(&state, provider, 10.0, 20.0).await;

    assert!(matches!(recv_event(&mut rx_a).await, ServerEvent::LocationUpdate { .. }));
    assert!(matches!(recv_event(&mut rx_b).await, ServerEvent::LocationUpdate { .. }));
}

// =============================================================================
// service snapshots
// =============================================================================

#[tokio::test]
async fn register_service_request_broadcasts_to_all_but_client() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let provider = Uuid::new_v4();
    let mut rx_client = connect_user(&state, client).await;
    let mut rx_provider = connect_user(&state, provider).await;

    let snapshot = ServiceSnapshot {
        id: Uuid::new_v4(),
        client_id: client,
        provider_id: None,
        status: ServiceStatus::Requested,
        category: "cleaning".into(),
        title: "Deep clean".into(),
    };
    register_service_request(&state, snapshot.clone()).await;

    match recv_event(&mut rx_provider).await {
        ServerEvent::NewServiceRequest { service, .. } => assert_eq!(service, snapshot),
        other => panic!("expected new service request, got {other:?}"),
    }
    assert_no_event(&mut rx_client).await;

    let realtime = state.realtime.read().await;
    assert!(realtime.active_services.contains_key(&snapshot.id));
}

#[tokio::test]
async fn update_service_status_notifies_both_parties() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let provider = Uuid::new_v4();
    let mut rx_client = connect_user(&state, client).await;
    let mut rx_provider = connect_user(&state, provider).await;
    let snapshot = seed_active_service(&state, client, None, ServiceStatus::Requested).await;

    let updated = update_service_status(&state, snapshot.id, ServiceStatus::Accepted, Some(provider)).await;
    assert!(updated);

    for rx in [&mut rx_client, &mut rx_provider] {
        match recv_event(rx).await {
            ServerEvent::ServiceStatusUpdate { service_id, status, service, .. } => {
                assert_eq!(service_id, snapshot.id);
                assert_eq!(status, ServiceStatus::Accepted);
                assert_eq!(service.provider_id, Some(provider));
            }
            other => panic!("expected status update, got {other:?}"),
        }
    }

    // Non-terminal: snapshot stays active with the assigned provider.
    let realtime = state.realtime.read().await;
    assert_eq!(
        realtime.active_services.get(&snapshot.id).and_then(|s| s.provider_id),
        Some(provider)
    );
}

#[tokio::test]
async fn terminal_status_evicts_snapshot() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let provider = Uuid::new_v4();
    let _rx_client = connect_user(&state, client).await;
    let snapshot = seed_active_service(&state, client, Some(provider), ServiceStatus::InProgress).await;

    assert!(update_service_status(&state, snapshot.id, ServiceStatus::Completed, None).await);

    let realtime = state.realtime.read().await;
    assert!(!realtime.active_services.contains_key(&snapshot.id));
}

#[tokio::test]
async fn update_unknown_service_returns_false() {
    let state = test_app_state();
    assert!(!update_service_status(&state, Uuid::new_v4(), ServiceStatus::Accepted, None).await);
}

// =============================================================================
// chat
// =============================================================================

#[tokio::test]
async fn chat_message_reaches_receiver_only_when_online() {
    let state = test_app_state();
    let sender = Uuid::new_v4();
    let receiver = Uuid::new_v4();
    let chat_id = Uuid::new_v4();
    let mut rx = connect_user(&state, receiver).await;

    assert!(send_chat_message(&state, sender, receiver, chat_id, "on my way").await);
    match recv_event(&mut rx).await {
        ServerEvent::ChatMessage { chat_id: got_chat, sender_id, message, .. } => {
            assert_eq!(got_chat, chat_id);
            assert_eq!(sender_id, sender);
            assert_eq!(message, "on my way");
        }
        other => panic!("expected chat message, got {other:?}"),
    }

    disconnect(&state, receiver).await;
    assert!(!send_chat_message(&state, sender, receiver, chat_id, "still there?").await);
}
