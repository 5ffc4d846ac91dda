//! Event — the message types carried over the duplex channel.
//!
//! DESIGN
//! ======
//! Every websocket payload is JSON with a `type` tag. Inbound and outbound
//! directions are separate closed enums: the transport layer
//! (`routes::ws`) parses [`ClientEvent`] and forwards [`ServerEvent`]
//! without ever inspecting payload fields itself.
//!
//! Events are ephemeral. Nothing here is persisted and a disconnect drops
//! any knowledge derived from prior events.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::ServiceStatus;

/// Current wall-clock time, stamped on outbound events.
#[must_use]
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Materialized view of a service request held by the realtime registry
/// while the request is active (not completed/cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub status: ServiceStatus,
    pub category: String,
    pub title: String,
}

// =============================================================================
// CLIENT → SERVER
// =============================================================================

/// Provider's answer to a broadcast service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceResponse {
    Accept,
    Reject,
}

/// Events a connected client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    LocationUpdate {
        latitude: f64,
        longitude: f64,
    },
    ProviderStatus {
        is_online: bool,
    },
    ServiceResponse {
        service_id: Uuid,
        response: ServiceResponse,
    },
}

// =============================================================================
// SERVER → CLIENT
// =============================================================================

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once immediately after a successful upgrade.
    Connected {
        user_id: Uuid,
    },
    LocationUpdate {
        user_id: Uuid,
        latitude: f64,
        longitude: f64,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    NewServiceRequest {
        service: ServiceSnapshot,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ServiceStatusUpdate {
        service_id: Uuid,
        status: ServiceStatus,
        service: ServiceSnapshot,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ChatMessage {
        chat_id: Uuid,
        sender_id: Uuid,
        message: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ProviderStatusChange {
        provider_id: Uuid,
        is_online: bool,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    /// Parse or dispatch failure reported back to the sender only.
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_parses_location_update() {
        let raw = r#"{"type":"location_update","latitude":-23.55,"longitude":-46.63}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::LocationUpdate { latitude: -23.55, longitude: -46.63 }
        );
    }

    #[test]
    fn client_event_parses_service_response() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"service_response","service_id":"{id}","response":"accept"}}"#);
        let event: ClientEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::ServiceResponse { service_id: id, response: ServiceResponse::Accept }
        );
    }

    #[test]
    fn client_event_rejects_unknown_type() {
        let raw = r#"{"type":"shutdown","latitude":1.0}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn server_event_tags_match_wire_names() {
        let event = ServerEvent::ProviderStatusChange {
            provider_id: Uuid::new_v4(),
            is_online: true,
            timestamp: now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "provider_status_change");
        assert_eq!(value["is_online"], true);

        let event = ServerEvent::NewServiceRequest {
            service: ServiceSnapshot {
                id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                provider_id: None,
                status: ServiceStatus::Requested,
                category: "cleaning".into(),
                title: "Deep clean".into(),
            },
            timestamp: now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "new_service_request");
        assert_eq!(value["service"]["status"], "requested");
    }

    #[test]
    fn server_event_round_trips() {
        let event = ServerEvent::ChatMessage {
            chat_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            message: "on my way".into(),
            timestamp: now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
