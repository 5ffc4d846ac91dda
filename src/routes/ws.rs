//! WebSocket handler — the duplex presence/location/chat channel.
//!
//! DESIGN
//! ======
//! On upgrade, the connection is authenticated with the same bearer JWT as
//! the REST surface (`?token=` query parameter) and registered in the
//! realtime registry. The handler then runs a `select!` loop:
//! - inbound client events → parse + dispatch via `process_inbound_event`
//! - events from peers (via the registry's per-connection channel) →
//!   forward to the socket
//!
//! Database writes triggered by inbound events are best-effort: the channel
//! stays up even when persistence fails, and only the failure is logged.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register connection → send `connected`
//! 2. Inbound events dispatched until close or send failure
//! 3. Cleanup: deregister (drops location), providers marked offline

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::{self, ClientEvent, ServerEvent, ServiceResponse};
use crate::models::{User, UserRole};
use crate::services::{auth, notify, realtime, request, user};
use crate::state::{AppState, CONNECTION_CHANNEL_CAPACITY};

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /api/ws?token=` — authenticate and upgrade.
pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.get("token") else {
        return (StatusCode::UNAUTHORIZED, "token required").into_response();
    };

    let user = match auth::authenticate(&state.pool, &state.auth, token).await {
        Ok(user) => user,
        Err(auth::AuthError::Db(e)) => {
            tracing::error!(error = %e, "ws auth lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "auth error").into_response();
        }
        Err(_) => return (StatusCode::UNAUTHORIZED, "invalid token").into_response(),
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user: User) {
    let user_id = user.id;
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(CONNECTION_CHANNEL_CAPACITY);
    realtime::connect(&state, user_id, tx).await;

    if send_event(&mut socket, &ServerEvent::Connected { user_id }).await.is_err() {
        realtime::disconnect(&state, user_id).await;
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = process_inbound_event(&state, &user, &text).await {
                            if send_event(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    realtime::disconnect(&state, user_id).await;
    if user.role == UserRole::Provider {
        if let Err(e) = user::set_online(&state.pool, user_id, false).await {
            warn!(%user_id, error = %e, "ws: offline flag update failed");
        }
        let event = ServerEvent::ProviderStatusChange {
            provider_id: user_id,
            is_online: false,
            timestamp: event::now(),
        };
        realtime::broadcast_to_providers(&state, &event, Some(user_id)).await;
    }
    info!(%user_id, "ws: connection closed");
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(json.into())).await
}

// =============================================================================
// INBOUND DISPATCH
// =============================================================================

/// Parse and apply one inbound event. Returns a reply for the sender only
/// (errors); fan-out to peers goes through the realtime registry.
///
/// Split out from the socket loop so dispatch semantics are testable
/// without a live websocket.
pub(crate) async fn process_inbound_event(state: &AppState, user: &User, text: &str) -> Option<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            return Some(ServerEvent::Error { message: format!("unparseable event: {e}") });
        }
    };

    match event {
        ClientEvent::LocationUpdate { latitude, longitude } => {
            let location = crate::models::GeoPoint { latitude, longitude };
            if let Err(e) = user::update_location(&state.pool, user.id, location).await {
                warn!(user_id = %user.id, error = %e, "ws: location persist failed");
            }
            realtime::update_location(state, user.id, latitude, longitude).await;
            None
        }
        ClientEvent::ProviderStatus { is_online } => {
            if user.role != UserRole::Provider {
                return Some(ServerEvent::Error { message: "only providers have an online status".to_string() });
            }
            if let Err(e) = user::set_online(&state.pool, user.id, is_online).await {
                warn!(user_id = %user.id, error = %e, "ws: online flag persist failed");
            }
            let event = ServerEvent::ProviderStatusChange {
                provider_id: user.id,
                is_online,
                timestamp: event::now(),
            };
            realtime::broadcast_to_providers(state, &event, Some(user.id)).await;
            None
        }
        ClientEvent::ServiceResponse { service_id, response } => match response {
            ServiceResponse::Accept => match request::accept(&state.pool, service_id, user).await {
                Ok(accepted) => {
                    realtime::update_service_status(state, service_id, accepted.status, Some(user.id)).await;
                    notify::notify_service_confirmed(&state.pool, &state.push, accepted.client_id, user.id, service_id)
                        .await;
                    None
                }
                Err(e) => Some(ServerEvent::Error { message: e.to_string() }),
            },
            ServiceResponse::Reject => {
                if let Err(e) = request::reject(&state.pool, service_id, user, request::RejectInput::default()).await {
                    warn!(%service_id, user_id = %user.id, error = %e, "ws: rejection log failed");
                }
                None
            }
        },
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
