use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ReservationEventStore, ReviewStore};
use crate::models::{ReservationEvent, ReservationStatus, Review, TargetType};

const REVIEW_COLUMNS: &str = "id, target_type, target_id, reviewer_username, host_username, \
                              accommodation_id, stars, created_at";

const RESERVATION_COLUMNS: &str =
    "reservation_id, guest_username, host_username, accommodation_id, status, recorded_at";

/// PostgreSQL-backed store for production persistence
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with the given connection string
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(max_connections, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations complete");

        Ok(())
    }
}

fn review_from_row(row: &PgRow) -> Result<Review> {
    let target_type: String = row.try_get("target_type")?;
    let stars: i16 = row.try_get("stars")?;

    Ok(Review {
        id: row.try_get("id")?,
        target_type: TargetType::parse(&target_type)
            .with_context(|| format!("Unknown target type in database: {}", target_type))?,
        target_id: row.try_get("target_id")?,
        reviewer_username: row.try_get("reviewer_username")?,
        host_username: row.try_get("host_username")?,
        accommodation_id: row.try_get("accommodation_id")?,
        stars: u8::try_from(stars)
            .with_context(|| format!("Star rating out of range in database: {}", stars))?,
        created_at: row.try_get("created_at")?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<ReservationEvent> {
    let status: String = row.try_get("status")?;

    Ok(ReservationEvent {
        reservation_id: row.try_get("reservation_id")?,
        guest_username: row.try_get("guest_username")?,
        host_username: row.try_get("host_username")?,
        accommodation_id: row.try_get("accommodation_id")?,
        status: ReservationStatus::parse(&status)
            .with_context(|| format!("Unknown reservation status in database: {}", status))?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

#[async_trait]
impl ReviewStore for PostgresStore {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Review>> {
        let row = sqlx::query(&format!("SELECT {} FROM reviews WHERE id = $1", REVIEW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load review")?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn find_by_target(
        &self,
        target_type: TargetType,
        target_id: &str,
    ) -> Result<Vec<Review>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reviews WHERE target_type = $1 AND target_id = $2",
            REVIEW_COLUMNS
        ))
        .bind(target_type.as_str())
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reviews by target")?;

        rows.iter().map(review_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Review>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reviews ORDER BY created_at DESC",
            REVIEW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reviews")?;

        rows.iter().map(review_from_row).collect()
    }

    async fn persist(&self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (
                id, target_type, target_id, reviewer_username,
                host_username, accommodation_id, stars, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(review.id)
        .bind(review.target_type.as_str())
        .bind(&review.target_id)
        .bind(&review.reviewer_username)
        .bind(&review.host_username)
        .bind(review.accommodation_id)
        .bind(i16::from(review.stars))
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert review")?;

        debug!(id = %review.id, "Inserted review");

        Ok(())
    }

    async fn update(&self, review: &Review) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE reviews SET
                target_type = $2, target_id = $3, reviewer_username = $4,
                host_username = $5, accommodation_id = $6, stars = $7
            WHERE id = $1
            "#,
        )
        .bind(review.id)
        .bind(review.target_type.as_str())
        .bind(&review.target_id)
        .bind(&review.reviewer_username)
        .bind(&review.host_username)
        .bind(review.accommodation_id)
        .bind(i16::from(review.stars))
        .execute(&self.pool)
        .await
        .context("Failed to update review")?;

        if result.rows_affected() == 0 {
            bail!("Review {} does not exist", review.id);
        }

        debug!(id = %review.id, "Updated review");

        Ok(())
    }

    async fn delete(&self, review: &Review) -> Result<()> {
        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review.id)
            .execute(&self.pool)
            .await
            .context("Failed to delete review")?;

        debug!(id = %review.id, "Deleted review");

        Ok(())
    }
}

#[async_trait]
impl ReservationEventStore for PostgresStore {
    async fn persist(&self, event: &ReservationEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reservation_events (
                reservation_id, guest_username, host_username,
                accommodation_id, status, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (reservation_id) DO UPDATE SET
                guest_username = EXCLUDED.guest_username,
                host_username = EXCLUDED.host_username,
                accommodation_id = EXCLUDED.accommodation_id,
                status = EXCLUDED.status,
                recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(&event.reservation_id)
        .bind(&event.guest_username)
        .bind(&event.host_username)
        .bind(event.accommodation_id)
        .bind(event.status.as_str())
        .bind(event.recorded_at)
        .execute(&self.pool)
        .await
        .context("Failed to save reservation event")?;

        debug!(reservation_id = %event.reservation_id, "Saved reservation event");

        Ok(())
    }

    async fn find_by_id(&self, reservation_id: &str) -> Result<Option<ReservationEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reservation_events WHERE reservation_id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load reservation event")?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn delete(&self, event: &ReservationEvent) -> Result<()> {
        sqlx::query("DELETE FROM reservation_events WHERE reservation_id = $1")
            .bind(&event.reservation_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete reservation event")?;

        debug!(reservation_id = %event.reservation_id, "Deleted reservation event");

        Ok(())
    }

    // Same predicate as ReservationEvent::qualifies_for_host
    async fn can_leave_review_on_host(&self, guest: &str, host: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservation_events
                WHERE guest_username = $1 AND host_username = $2 AND status <> 'CANCELLED'
            ) AS eligible
            "#,
        )
        .bind(guest)
        .bind(host)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check host review eligibility")?;

        Ok(row.try_get("eligible")?)
    }

    async fn can_leave_review_on_accommodation(
        &self,
        guest: &str,
        accommodation_id: i64,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservation_events
                WHERE guest_username = $1 AND accommodation_id = $2 AND status <> 'CANCELLED'
            ) AS eligible
            "#,
        )
        .bind(guest)
        .bind(accommodation_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check accommodation review eligibility")?;

        Ok(row.try_get("eligible")?)
    }
}
