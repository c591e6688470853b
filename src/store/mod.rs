pub mod json;
pub mod memory;
pub mod postgres;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ReservationEvent, Review, TargetType};

/// Persistence backend for reviews
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Load a review by ID
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Review>>;

    /// List reviews about one target, in no particular order
    async fn find_by_target(&self, target_type: TargetType, target_id: &str)
        -> Result<Vec<Review>>;

    /// List every stored review
    async fn list_all(&self) -> Result<Vec<Review>>;

    /// Insert a new review. Fails if the ID is already taken.
    async fn persist(&self, review: &Review) -> Result<()>;

    /// Overwrite the stored review with the same ID. Fails if there is none.
    async fn update(&self, review: &Review) -> Result<()>;

    /// Remove a review
    async fn delete(&self, review: &Review) -> Result<()>;
}

/// Persistence backend for reservation events, queried to decide review eligibility
#[async_trait]
pub trait ReservationEventStore: Send + Sync {
    /// Insert an event, replacing any event with the same reservation ID
    async fn persist(&self, event: &ReservationEvent) -> Result<()>;

    async fn find_by_id(&self, reservation_id: &str) -> Result<Option<ReservationEvent>>;

    async fn delete(&self, event: &ReservationEvent) -> Result<()>;

    /// True if some stored event satisfies [`ReservationEvent::qualifies_for_host`]
    async fn can_leave_review_on_host(&self, guest: &str, host: &str) -> Result<bool>;

    /// True if some stored event satisfies [`ReservationEvent::qualifies_for_accommodation`]
    async fn can_leave_review_on_accommodation(
        &self,
        guest: &str,
        accommodation_id: i64,
    ) -> Result<bool>;
}
