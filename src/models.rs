use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a review is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetType {
    Host,
    Accommodation,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Host => "HOST",
            TargetType::Accommodation => "ACCOMMODATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HOST" => Some(TargetType::Host),
            "ACCOMMODATION" => Some(TargetType::Accommodation),
            _ => None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A star rating left by a guest on a host or an accommodation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub target_type: TargetType,
    pub target_id: String,
    pub reviewer_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation_id: Option<i64>,
    pub stars: u8,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn for_host(reviewer: impl Into<String>, host: impl Into<String>, stars: u8) -> Self {
        let host = host.into();
        Self {
            id: Uuid::new_v4(),
            target_type: TargetType::Host,
            target_id: host.clone(),
            reviewer_username: reviewer.into(),
            host_username: Some(host),
            accommodation_id: None,
            stars,
            created_at: Utc::now(),
        }
    }

    pub fn for_accommodation(reviewer: impl Into<String>, accommodation_id: i64, stars: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_type: TargetType::Accommodation,
            target_id: accommodation_id.to_string(),
            reviewer_username: reviewer.into(),
            host_username: None,
            accommodation_id: Some(accommodation_id),
            stars,
            created_at: Utc::now(),
        }
    }

    /// Replace the generated id, used when resubmitting an existing review
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Human readable target, e.g. `HOST bob`
    pub fn target(&self) -> String {
        format!("{} {}", self.target_type, self.target_id)
    }
}

/// Lifecycle state of a reservation as reported by the reservation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    #[default]
    Reserved,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RESERVED" => Some(ReservationStatus::Reserved),
            "COMPLETED" => Some(ReservationStatus::Completed),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }
}

/// A reservation between a guest and a host's accommodation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationEvent {
    pub reservation_id: String,
    pub guest_username: String,
    pub host_username: String,
    pub accommodation_id: i64,
    #[serde(default)]
    pub status: ReservationStatus,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl ReservationEvent {
    pub fn new(
        reservation_id: impl Into<String>,
        guest_username: impl Into<String>,
        host_username: impl Into<String>,
        accommodation_id: i64,
        status: ReservationStatus,
    ) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            guest_username: guest_username.into(),
            host_username: host_username.into(),
            accommodation_id,
            status,
            recorded_at: Utc::now(),
        }
    }

    /// Whether this reservation entitles `guest` to review `host`.
    ///
    /// Any reservation that was not cancelled counts.
    pub fn qualifies_for_host(&self, guest: &str, host: &str) -> bool {
        self.status != ReservationStatus::Cancelled
            && self.guest_username == guest
            && self.host_username == host
    }

    /// Whether this reservation entitles `guest` to review the accommodation.
    pub fn qualifies_for_accommodation(&self, guest: &str, accommodation_id: i64) -> bool {
        self.status != ReservationStatus::Cancelled
            && self.guest_username == guest
            && self.accommodation_id == accommodation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_review_sets_target() {
        let review = Review::for_host("alice", "bob", 5);
        assert_eq!(review.target_type, TargetType::Host);
        assert_eq!(review.target_id, "bob");
        assert_eq!(review.host_username.as_deref(), Some("bob"));
        assert!(review.accommodation_id.is_none());
    }

    #[test]
    fn test_accommodation_review_sets_target() {
        let review = Review::for_accommodation("alice", 42, 4);
        assert_eq!(review.target_type, TargetType::Accommodation);
        assert_eq!(review.target_id, "42");
        assert_eq!(review.accommodation_id, Some(42));
        assert!(review.host_username.is_none());
    }

    #[test]
    fn test_target_type_wire_format() {
        let json = serde_json::to_string(&TargetType::Accommodation).unwrap();
        assert_eq!(json, "\"ACCOMMODATION\"");
        assert_eq!(TargetType::parse("host"), Some(TargetType::Host));
        assert_eq!(TargetType::parse("guest"), None);
    }

    #[test]
    fn test_parse_review_without_optional_fields() {
        let json = r#"{
            "id": "7f1c9a52-8f3e-4a55-9a0e-6b8c2f3f1d10",
            "target_type": "HOST",
            "target_id": "bob",
            "reviewer_username": "alice",
            "host_username": "bob",
            "stars": 5
        }"#;

        let review: Review = serde_json::from_str(json).unwrap();
        assert_eq!(review.stars, 5);
        assert!(review.accommodation_id.is_none());
    }

    #[test]
    fn test_cancelled_reservation_does_not_qualify() {
        let mut event = ReservationEvent::new("r1", "alice", "bob", 7, ReservationStatus::Completed);
        assert!(event.qualifies_for_host("alice", "bob"));
        assert!(event.qualifies_for_accommodation("alice", 7));
        assert!(!event.qualifies_for_host("mallory", "bob"));
        assert!(!event.qualifies_for_accommodation("alice", 8));

        event.status = ReservationStatus::Cancelled;
        assert!(!event.qualifies_for_host("alice", "bob"));
        assert!(!event.qualifies_for_accommodation("alice", 7));
    }
}
