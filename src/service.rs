use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ReviewError, Result};
use crate::locks::KeyedLocks;
use crate::models::{ReservationEvent, Review, TargetType};
use crate::store::{ReservationEventStore, ReviewStore};

/// Review operations on top of a review store and a reservation event store.
///
/// Operations that read a review and then write it back hold a per-ID lock for
/// the duration, so concurrent submissions for one ID are applied one at a time.
pub struct ReviewService<R: ReviewStore, E: ReservationEventStore> {
    reviews: R,
    reservations: E,
    locks: KeyedLocks<Uuid>,
}

impl<R: ReviewStore, E: ReservationEventStore> ReviewService<R, E> {
    pub fn new(reviews: R, reservations: E) -> Self {
        Self {
            reviews,
            reservations,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Review>> {
        Ok(self.reviews.list_all().await?)
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<Review>> {
        Ok(self.reviews.find_by_id(id).await?)
    }

    /// List reviews about a host (by username) or an accommodation (by numeric ID)
    pub async fn get_by_target(
        &self,
        target_type: TargetType,
        target_id: &str,
    ) -> Result<Vec<Review>> {
        let reviews = match target_type {
            TargetType::Host => self.reviews.find_by_target(target_type, target_id).await?,
            TargetType::Accommodation => {
                let accommodation_id: i64 = target_id
                    .parse()
                    .map_err(|_| ReviewError::InvalidTargetId(target_id.to_string()))?;
                self.reviews
                    .find_by_target(target_type, &accommodation_id.to_string())
                    .await?
            }
        };

        Ok(reviews)
    }

    /// Store a review, or update the stars of the review already stored under its ID.
    ///
    /// Fields other than `stars` are never changed on resubmission.
    pub async fn add_review(&self, review: &Review) -> Result<()> {
        self.validate_review_permission(review).await?;

        let _guard = self.locks.lock(review.id).await;

        match self.reviews.find_by_id(&review.id).await? {
            Some(mut existing) => {
                info!(id = %review.id, stars = review.stars, "Updating review");
                existing.stars = review.stars;
                self.reviews.update(&existing).await?;
            }
            None => {
                info!(
                    id = %review.id,
                    reviewer = %review.reviewer_username,
                    target = %review.target(),
                    stars = review.stars,
                    "Saving review"
                );
                self.reviews.persist(review).await?;
            }
        }

        info!(id = %review.id, "Review saved");

        Ok(())
    }

    /// Copy `stars` from `updated` onto the stored review. Anyone may do this.
    pub async fn update_review(&self, id: &Uuid, updated: &Review) -> Result<Review> {
        let _guard = self.locks.lock(*id).await;

        let mut existing = self
            .reviews
            .find_by_id(id)
            .await?
            .ok_or(ReviewError::NotFound(*id))?;

        existing.stars = updated.stars;
        self.reviews.update(&existing).await?;

        info!(id = %id, stars = existing.stars, "Review updated");

        Ok(existing)
    }

    /// Delete a review on behalf of `username`.
    ///
    /// Returns `NotFound` both when the review is missing and when `username`
    /// is not its author.
    pub async fn delete_review(&self, id: &Uuid, username: &str) -> Result<()> {
        let _guard = self.locks.lock(*id).await;

        let review = match self.reviews.find_by_id(id).await? {
            Some(review) if review.reviewer_username == username => review,
            Some(_) => {
                warn!(id = %id, user = username, "Refusing to delete review by another user");
                return Err(ReviewError::NotFound(*id));
            }
            None => return Err(ReviewError::NotFound(*id)),
        };

        self.reviews.delete(&review).await?;

        info!(id = %id, user = username, "Review deleted");

        Ok(())
    }

    pub async fn save_reservation_event(&self, event: &ReservationEvent) -> Result<()> {
        self.reservations.persist(event).await?;

        info!(
            reservation_id = %event.reservation_id,
            guest = %event.guest_username,
            status = event.status.as_str(),
            "Reservation event saved"
        );

        Ok(())
    }

    /// Remove a reservation event. Unknown IDs are ignored.
    pub async fn remove_reservation_event(&self, reservation_id: &str) -> Result<()> {
        if let Some(event) = self.reservations.find_by_id(reservation_id).await? {
            self.reservations.delete(&event).await?;
            info!(reservation_id, "Reservation event removed");
        }

        Ok(())
    }

    pub async fn can_leave_review_on_host(&self, guest: &str, host: Option<&str>) -> Result<bool> {
        let host = match host {
            Some(host) if !is_blank(guest) && !is_blank(host) => host,
            _ => return Ok(false),
        };

        Ok(self.reservations.can_leave_review_on_host(guest, host).await?)
    }

    pub async fn can_leave_review_on_accommodation(
        &self,
        guest: &str,
        accommodation_id: Option<i64>,
    ) -> Result<bool> {
        let accommodation_id = match accommodation_id {
            Some(id) if !is_blank(guest) => id,
            _ => return Ok(false),
        };

        Ok(self
            .reservations
            .can_leave_review_on_accommodation(guest, accommodation_id)
            .await?)
    }

    async fn validate_review_permission(&self, review: &Review) -> Result<()> {
        info!(id = %review.id, reviewer = %review.reviewer_username, "Adding review");

        let allowed = match review.target_type {
            TargetType::Host => {
                self.can_leave_review_on_host(
                    &review.reviewer_username,
                    review.host_username.as_deref(),
                )
                .await?
            }
            TargetType::Accommodation => {
                self.can_leave_review_on_accommodation(
                    &review.reviewer_username,
                    review.accommodation_id,
                )
                .await?
            }
        };

        if !allowed {
            let target = match review.target_type {
                TargetType::Host => format!(
                    "host {}",
                    review.host_username.as_deref().unwrap_or_default()
                ),
                TargetType::Accommodation => format!(
                    "accommodation {}",
                    review
                        .accommodation_id
                        .map(|id| id.to_string())
                        .unwrap_or_default()
                ),
            };
            warn!(reviewer = %review.reviewer_username, target = %target, "Review not permitted");
            return Err(ReviewError::CantLeaveReview {
                reviewer: review.reviewer_username.clone(),
                target,
            });
        }

        Ok(())
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
