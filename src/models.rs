//! Domain model types shared across services and routes.
//!
//! DESIGN
//! ======
//! Roles and statuses are closed enums stored as Postgres enum types
//! (`user_role`, `service_status`, `offer_status`). Row structs mirror the
//! tables they come from; the password hash never leaves `services::auth`
//! and is deliberately not a field on [`User`].

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ROLES & STATUSES
// =============================================================================

/// Marketplace role. A user holds exactly one at a time and may switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    Client,
    Provider,
}

impl UserRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Provider => "provider",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Self::Client),
            "provider" => Some(Self::Provider),
            _ => None,
        }
    }

    /// The counterpart role, used by role switching.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Client => Self::Provider,
            Self::Provider => Self::Client,
        }
    }
}

/// Service request lifecycle. Terminal states are completed and cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "service_status", rename_all = "snake_case")]
pub enum ServiceStatus {
    Requested,
    Matched,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Matched => "matched",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "matched" => Some(Self::Matched),
            "accepted" => Some(Self::Accepted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses end the request lifecycle and evict any realtime
    /// snapshot of the request.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Offer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "offer_status", rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

// =============================================================================
// GEO
// =============================================================================

/// Latitude/longitude pair carried on users, requests, and location pings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// =============================================================================
// ROWS
// =============================================================================

/// Public user record. Mirrors the `users` table minus the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    /// Provider categories, if the user advertises any.
    pub categories: Option<Vec<String>>,
    /// Mean of reviews received, one decimal place. None until first review.
    pub rating: Option<f64>,
    pub is_online: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A client's posted job seeking a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub category: String,
    pub title: String,
    pub description: String,
    pub status: ServiceStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub final_price: Option<f64>,
    /// Estimated duration in minutes.
    pub estimated_duration: Option<i32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ServiceRequest {
    /// Returns the request party opposite to `user_id`, if any.
    #[must_use]
    pub fn counterparty(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.client_id {
            self.provider_id
        } else if self.provider_id == Some(user_id) {
            Some(self.client_id)
        } else {
            None
        }
    }

    /// Whether `user_id` is the request's client or its assigned provider.
    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.client_id || self.provider_id == Some(user_id)
    }
}

/// A provider's bid against a service request.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub provider_id: Uuid,
    pub price: f64,
    /// Estimated duration in minutes.
    pub estimated_duration: i32,
    pub message: Option<String>,
    pub status: OfferStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
}

/// Local ledger row for a remote checkout session. Keyed by the remote
/// session id; immutable once `payment_status` reaches `"paid"`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentTransaction {
    pub session_id: String,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub package_id: String,
    pub status: String,
    pub payment_status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_and_flips() {
        for role in [UserRole::Client, UserRole::Provider] {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
            assert_eq!(role.flipped().flipped(), role);
        }
        assert_eq!(UserRole::from_str("admin"), None);
        assert_eq!(UserRole::Client.flipped(), UserRole::Provider);
    }

    #[test]
    fn service_status_round_trips() {
        for status in [
            ServiceStatus::Requested,
            ServiceStatus::Matched,
            ServiceStatus::Accepted,
            ServiceStatus::InProgress,
            ServiceStatus::Completed,
            ServiceStatus::Cancelled,
        ] {
            assert_eq!(ServiceStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ServiceStatus::from_str("pending"), None);
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        assert!(ServiceStatus::Completed.is_terminal());
        assert!(ServiceStatus::Cancelled.is_terminal());
        assert!(!ServiceStatus::Requested.is_terminal());
        assert!(!ServiceStatus::InProgress.is_terminal());
    }

    #[test]
    fn counterparty_resolves_other_party_only() {
        let client = Uuid::new_v4();
        let provider = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let request = ServiceRequest {
            id: Uuid::new_v4(),
            client_id: client,
            provider_id: Some(provider),
            category: "cleaning".into(),
            title: "t".into(),
            description: "d".into(),
            status: ServiceStatus::Accepted,
            latitude: 0.0,
            longitude: 0.0,
            address: "a".into(),
            budget_min: None,
            budget_max: None,
            final_price: None,
            estimated_duration: None,
            started_at: None,
            completed_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };

        assert_eq!(request.counterparty(client), Some(provider));
        assert_eq!(request.counterparty(provider), Some(client));
        assert_eq!(request.counterparty(stranger), None);
        assert!(request.is_participant(client));
        assert!(request.is_participant(provider));
        assert!(!request.is_participant(stranger));
    }

    #[test]
    fn unassigned_request_has_no_counterparty_for_client() {
        let client = Uuid::new_v4();
        let request = ServiceRequest {
            id: Uuid::new_v4(),
            client_id: client,
            provider_id: None,
            category: "gardening".into(),
            title: "t".into(),
            description: "d".into(),
            status: ServiceStatus::Requested,
            latitude: 0.0,
            longitude: 0.0,
            address: "a".into(),
            budget_min: None,
            budget_max: None,
            final_price: None,
            estimated_duration: None,
            started_at: None,
            completed_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(request.counterparty(client), None);
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ServiceStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: ServiceStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, ServiceStatus::InProgress);
    }
}
