//! Realtime service — connection/presence registry and event relay.
//!
//! DESIGN
//! ======
//! Tracks which users hold a live duplex connection and relays ephemeral
//! events (location pings, status changes, chat) to the counterparties of
//! active service requests. State lives in `AppState::realtime` behind an
//! `RwLock`; senders are cloned out of the lock before any delivery so no
//! await happens while holding it.
//!
//! FAILURE SEMANTICS
//! =================
//! A send failure to one connection (closed or full channel) evicts that
//! connection and its location entry. It never aborts a multi-target
//! broadcast, and nothing here is persisted: missed events stay missed.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{self, ServerEvent, ServiceSnapshot};
use crate::models::{GeoPoint, ServiceStatus};
use crate::state::AppState;

// =============================================================================
// CONNECTION LIFECYCLE
// =============================================================================

/// Register a user's connection sender.
pub async fn connect(state: &AppState, user_id: Uuid, tx: mpsc::Sender<ServerEvent>) {
    let mut realtime = state.realtime.write().await;
    realtime.connections.insert(user_id, tx);
    info!(%user_id, connected = realtime.connections.len(), "realtime: user connected");
}

/// Drop a user's connection and last known location.
pub async fn disconnect(state: &AppState, user_id: Uuid) {
    let mut realtime = state.realtime.write().await;
    realtime.connections.remove(&user_id);
    realtime.locations.remove(&user_id);
    info!(%user_id, connected = realtime.connections.len(), "realtime: user disconnected");
}

/// Whether a user currently holds a connection.
pub async fn is_connected(state: &AppState, user_id: Uuid) -> bool {
    state.realtime.read().await.connections.contains_key(&user_id)
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Deliver an event to one user if connected. Returns whether delivery
/// happened; a dead channel evicts the connection.
pub async fn unicast(state: &AppState, user_id: Uuid, event: ServerEvent) -> bool {
    let tx = state.realtime.read().await.connections.get(&user_id).cloned();
    let Some(tx) = tx else {
        return false;
    };

    if tx.try_send(event).is_ok() {
        true
    } else {
        warn!(%user_id, "realtime: send failed, evicting connection");
        disconnect(state, user_id).await;
        false
    }
}

/// Deliver an event to every connected user except `exclude`. Returns the
/// delivered count. Used indiscriminately for new-request and
/// provider-status events; no category/location filtering.
pub async fn broadcast_to_providers(state: &AppState, event: &ServerEvent, exclude: Option<Uuid>) -> usize {
    let targets: Vec<(Uuid, mpsc::Sender<ServerEvent>)> = {
        let realtime = state.realtime.read().await;
        realtime
            .connections
            .iter()
            .filter(|(user_id, _)| exclude != Some(**user_id))
            .map(|(user_id, tx)| (*user_id, tx.clone()))
            .collect()
    };

    let mut sent = 0;
    let mut dead = Vec::new();
    for (user_id, tx) in targets {
        if tx.try_send(event.clone()).is_ok() {
            sent += 1;
        } else {
            dead.push(user_id);
        }
    }

    if !dead.is_empty() {
        let mut realtime = state.realtime.write().await;
        for user_id in dead {
            realtime.connections.remove(&user_id);
            realtime.locations.remove(&user_id);
            warn!(%user_id, "realtime: broadcast send failed, evicted connection");
        }
    }
    sent
}

// =============================================================================
// LOCATION
// =============================================================================

/// Record a user's location and fan it out to the other party of every
/// active service request the user appears in — and nobody else.
pub async fn update_location(state: &AppState, user_id: Uuid, latitude: f64, longitude: f64) {
    let counterparties: HashSet<Uuid> = {
        let mut realtime = state.realtime.write().await;
        realtime.locations.insert(user_id, GeoPoint { latitude, longitude });

        realtime
            .active_services
            .values()
            .filter(|service| service.client_id == user_id || service.provider_id == Some(user_id))
            .flat_map(|service| {
                [Some(service.client_id), service.provider_id]
                    .into_iter()
                    .flatten()
            })
            .filter(|target| *target != user_id)
            .collect()
    };

    let event = ServerEvent::LocationUpdate { user_id, latitude, longitude, timestamp: event::now() };
    for target in counterparties {
        unicast(state, target, event.clone()).await;
    }
}

/// Last known location of a connected user.
pub async fn user_location(state: &AppState, user_id: Uuid) -> Option<GeoPoint> {
    state.realtime.read().await.locations.get(&user_id).copied()
}

// =============================================================================
// SERVICE SNAPSHOTS
// =============================================================================

/// Mark a request active and announce it to all connected users except the
/// requesting client.
pub async fn register_service_request(state: &AppState, snapshot: ServiceSnapshot) {
    let client_id = snapshot.client_id;
    let service_id = snapshot.id;
    {
        let mut realtime = state.realtime.write().await;
        realtime.active_services.insert(service_id, snapshot.clone());
    }

    let event = ServerEvent::NewServiceRequest { service: snapshot, timestamp: event::now() };
    let sent = broadcast_to_providers(state, &event, Some(client_id)).await;
    info!(%service_id, sent, "realtime: service request broadcast");
}

/// Mutate an active request's snapshot and notify its client and (if
/// assigned) provider. Evicts the snapshot once the status is terminal.
/// Returns false if the request is not active.
pub async fn update_service_status(
    state: &AppState,
    service_id: Uuid,
    status: ServiceStatus,
    provider_id: Option<Uuid>,
) -> bool {
    let snapshot = {
        let mut realtime = state.realtime.write().await;
        let Some(service) = realtime.active_services.get_mut(&service_id) else {
            return false;
        };
        service.status = status;
        if provider_id.is_some() {
            service.provider_id = provider_id;
        }
        let snapshot = service.clone();
        if status.is_terminal() {
            realtime.active_services.remove(&service_id);
        }
        snapshot
    };

    let event = ServerEvent::ServiceStatusUpdate {
        service_id,
        status,
        service: snapshot.clone(),
        timestamp: event::now(),
    };

    unicast(state, snapshot.client_id, event.clone()).await;
    if let Some(provider) = snapshot.provider_id {
        unicast(state, provider, event).await;
    }
    true
}

// =============================================================================
// CHAT
// =============================================================================

/// Relay a chat message to the receiver if online. Returns whether the
/// receiver got it.
pub async fn send_chat_message(
    state: &AppState,
    sender_id: Uuid,
    receiver_id: Uuid,
    chat_id: Uuid,
    message: &str,
) -> bool {
    let event = ServerEvent::ChatMessage {
        chat_id,
        sender_id,
        message: message.to_owned(),
        timestamp: event::now(),
    };
    unicast(state, receiver_id, event).await
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
