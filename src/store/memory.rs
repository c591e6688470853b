use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use super::{ReservationEventStore, ReviewStore};
use crate::models::{ReservationEvent, Review, TargetType};

/// In-memory store for tests and dry runs. Nothing survives the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    reviews: Arc<RwLock<HashMap<Uuid, Review>>>,
    reservations: Arc<RwLock<HashMap<String, ReservationEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock was poisoned")
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Review>> {
        let reviews = self.reviews.read().map_err(poisoned)?;
        Ok(reviews.get(id).cloned())
    }

    async fn find_by_target(
        &self,
        target_type: TargetType,
        target_id: &str,
    ) -> Result<Vec<Review>> {
        let reviews = self.reviews.read().map_err(poisoned)?;
        Ok(reviews
            .values()
            .filter(|r| r.target_type == target_type && r.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Review>> {
        let reviews = self.reviews.read().map_err(poisoned)?;
        Ok(reviews.values().cloned().collect())
    }

    async fn persist(&self, review: &Review) -> Result<()> {
        let mut reviews = self.reviews.write().map_err(poisoned)?;
        if reviews.contains_key(&review.id) {
            bail!("Review {} already exists", review.id);
        }
        reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn update(&self, review: &Review) -> Result<()> {
        let mut reviews = self.reviews.write().map_err(poisoned)?;
        match reviews.get_mut(&review.id) {
            Some(stored) => {
                *stored = review.clone();
                Ok(())
            }
            None => bail!("Review {} does not exist", review.id),
        }
    }

    async fn delete(&self, review: &Review) -> Result<()> {
        let mut reviews = self.reviews.write().map_err(poisoned)?;
        reviews.remove(&review.id);
        Ok(())
    }
}

#[async_trait]
impl ReservationEventStore for MemoryStore {
    async fn persist(&self, event: &ReservationEvent) -> Result<()> {
        let mut events = self.reservations.write().map_err(poisoned)?;
        events.insert(event.reservation_id.clone(), event.clone());
        Ok(())
    }

    async fn find_by_id(&self, reservation_id: &str) -> Result<Option<ReservationEvent>> {
        let events = self.reservations.read().map_err(poisoned)?;
        Ok(events.get(reservation_id).cloned())
    }

    async fn delete(&self, event: &ReservationEvent) -> Result<()> {
        let mut events = self.reservations.write().map_err(poisoned)?;
        events.remove(&event.reservation_id);
        Ok(())
    }

    async fn can_leave_review_on_host(&self, guest: &str, host: &str) -> Result<bool> {
        let events = self.reservations.read().map_err(poisoned)?;
        Ok(events.values().any(|e| e.qualifies_for_host(guest, host)))
    }

    async fn can_leave_review_on_accommodation(
        &self,
        guest: &str,
        accommodation_id: i64,
    ) -> Result<bool> {
        let events = self.reservations.read().map_err(poisoned)?;
        Ok(events
            .values()
            .any(|e| e.qualifies_for_accommodation(guest, accommodation_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationStatus;

    #[tokio::test]
    async fn test_update_requires_existing_review() {
        let store = MemoryStore::new();
        let review = Review::for_host("alice", "bob", 4);

        assert!(store.update(&review).await.is_err());
        ReviewStore::persist(&store, &review).await.unwrap();
        assert!(store.update(&review).await.is_ok());
    }

    #[tokio::test]
    async fn test_persist_replaces_reservation_with_same_id() {
        let store = MemoryStore::new();

        let event = ReservationEvent::new("r1", "alice", "bob", 1, ReservationStatus::Reserved);
        ReservationEventStore::persist(&store, &event).await.unwrap();
        assert!(store.can_leave_review_on_host("alice", "bob").await.unwrap());

        let cancelled =
            ReservationEvent::new("r1", "alice", "bob", 1, ReservationStatus::Cancelled);
        ReservationEventStore::persist(&store, &cancelled).await.unwrap();
        assert!(!store.can_leave_review_on_host("alice", "bob").await.unwrap());
    }
}
