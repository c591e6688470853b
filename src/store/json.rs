use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ReservationEventStore, ReviewStore};
use crate::models::{ReservationEvent, Review, TargetType};

/// JSON file-based store.
///
/// Each review lives in `reviews/<id>.json`, with `reviews/index.json` mapping
/// IDs to targets. Reservation events are kept together in `reservations.json`.
///
/// Files are replaced atomically, so readers never take a lock. Writers hold an
/// exclusive advisory lock on `.lock`, which also covers other processes and
/// other `JsonStore`s opened on the same directory.
#[derive(Clone)]
pub struct JsonStore {
    base_path: PathBuf,
}

impl JsonStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let reviews_dir = base_path.join("reviews");
        fs::create_dir_all(&reviews_dir).with_context(|| {
            format!("Failed to create store directory: {}", reviews_dir.display())
        })?;

        info!(path = %base_path.display(), "Initialized JSON store");

        Ok(Self { base_path })
    }

    fn review_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join("reviews").join(format!("{}.json", id))
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join("reviews").join("index.json")
    }

    fn reservations_path(&self) -> PathBuf {
        self.base_path.join("reservations.json")
    }

    /// Block until this caller is the only writer. Released when the file is dropped.
    fn lock(&self) -> Result<File> {
        let path = self.base_path.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        FileExt::lock_exclusive(&file)
            .with_context(|| format!("Failed to lock {}", path.display()))?;

        Ok(file)
    }

    fn load_index(&self) -> Result<ReviewIndex> {
        read_json_or_default(&self.index_path())
    }

    fn save_index(&self, index: &ReviewIndex) -> Result<()> {
        write_json(&self.index_path(), index)
    }

    fn load_review(&self, id: &Uuid) -> Result<Option<Review>> {
        read_json(&self.review_path(id))
    }

    fn write_review(&self, review: &Review) -> Result<()> {
        write_json(&self.review_path(&review.id), review)?;

        let mut index = self.load_index()?;
        index.reviews.retain(|r| r.id != review.id);
        index.reviews.push(ReviewIndexEntry {
            id: review.id,
            target_type: review.target_type,
            target_id: review.target_id.clone(),
        });
        self.save_index(&index)
    }

    fn load_reservations(&self) -> Result<Vec<ReservationEvent>> {
        read_json_or_default(&self.reservations_path())
    }

    fn save_reservations(&self, events: &[ReservationEvent]) -> Result<()> {
        write_json(&self.reservations_path(), events)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReviewIndex {
    reviews: Vec<ReviewIndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReviewIndexEntry {
    id: Uuid,
    target_type: TargetType,
    target_id: String,
}

/// Read and parse a JSON file, `None` if it does not exist
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    Ok(read_json(path)?.unwrap_or_default())
}

/// Write to a temp file next to `path`, then rename it over `path`
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

#[async_trait]
impl ReviewStore for JsonStore {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Review>> {
        self.load_review(id)
    }

    async fn find_by_target(
        &self,
        target_type: TargetType,
        target_id: &str,
    ) -> Result<Vec<Review>> {
        let index = self.load_index()?;

        let mut reviews = Vec::new();
        for entry in index
            .reviews
            .iter()
            .filter(|r| r.target_type == target_type && r.target_id == target_id)
        {
            if let Some(review) = self.load_review(&entry.id)? {
                reviews.push(review);
            }
        }

        Ok(reviews)
    }

    async fn list_all(&self) -> Result<Vec<Review>> {
        let index = self.load_index()?;

        let mut reviews = Vec::new();
        for entry in &index.reviews {
            if let Some(review) = self.load_review(&entry.id)? {
                reviews.push(review);
            }
        }

        Ok(reviews)
    }

    async fn persist(&self, review: &Review) -> Result<()> {
        let _guard = self.lock()?;

        if self.review_path(&review.id).exists() {
            bail!("Review {} already exists", review.id);
        }
        self.write_review(review)?;

        debug!(id = %review.id, "Inserted review");

        Ok(())
    }

    async fn update(&self, review: &Review) -> Result<()> {
        let _guard = self.lock()?;

        if !self.review_path(&review.id).exists() {
            bail!("Review {} does not exist", review.id);
        }
        self.write_review(review)?;

        debug!(id = %review.id, "Updated review");

        Ok(())
    }

    async fn delete(&self, review: &Review) -> Result<()> {
        let _guard = self.lock()?;

        let path = self.review_path(&review.id);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete review: {}", path.display()))?;
        }

        let mut index = self.load_index()?;
        index.reviews.retain(|r| r.id != review.id);
        self.save_index(&index)?;

        debug!(id = %review.id, "Deleted review");

        Ok(())
    }
}

#[async_trait]
impl ReservationEventStore for JsonStore {
    async fn persist(&self, event: &ReservationEvent) -> Result<()> {
        let _guard = self.lock()?;

        let mut events = self.load_reservations()?;
        events.retain(|e| e.reservation_id != event.reservation_id);
        events.push(event.clone());
        self.save_reservations(&events)?;

        debug!(reservation_id = %event.reservation_id, "Saved reservation event");

        Ok(())
    }

    async fn find_by_id(&self, reservation_id: &str) -> Result<Option<ReservationEvent>> {
        let events = self.load_reservations()?;
        Ok(events
            .into_iter()
            .find(|e| e.reservation_id == reservation_id))
    }

    async fn delete(&self, event: &ReservationEvent) -> Result<()> {
        let _guard = self.lock()?;

        let mut events = self.load_reservations()?;
        events.retain(|e| e.reservation_id != event.reservation_id);
        self.save_reservations(&events)?;

        debug!(reservation_id = %event.reservation_id, "Deleted reservation event");

        Ok(())
    }

    async fn can_leave_review_on_host(&self, guest: &str, host: &str) -> Result<bool> {
        let events = self.load_reservations()?;
        Ok(events.iter().any(|e| e.qualifies_for_host(guest, host)))
    }

    async fn can_leave_review_on_accommodation(
        &self,
        guest: &str,
        accommodation_id: i64,
    ) -> Result<bool> {
        let events = self.load_reservations()?;
        Ok(events
            .iter()
            .any(|e| e.qualifies_for_accommodation(guest, accommodation_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_and_find() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        let review = Review::for_host("alice", "bob", 5);
        ReviewStore::persist(&store, &review).await.unwrap();

        let loaded = ReviewStore::find_by_id(&store, &review.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, review);
    }

    #[tokio::test]
    async fn test_persist_rejects_duplicate_id() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        let review = Review::for_host("alice", "bob", 5);
        ReviewStore::persist(&store, &review).await.unwrap();
        assert!(ReviewStore::persist(&store, &review).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_target() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        let on_bob = Review::for_host("alice", "bob", 5);
        let on_carol = Review::for_host("alice", "carol", 2);
        let on_flat = Review::for_accommodation("alice", 12, 4);
        for review in [&on_bob, &on_carol, &on_flat] {
            ReviewStore::persist(&store, review).await.unwrap();
        }

        let found = store.find_by_target(TargetType::Host, "bob").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, on_bob.id);

        let found = store
            .find_by_target(TargetType::Accommodation, "12")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, on_flat.id);

        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        let mut review = Review::for_accommodation("alice", 3, 5);
        assert!(store.update(&review).await.is_err());

        ReviewStore::persist(&store, &review).await.unwrap();
        review.stars = 1;
        store.update(&review).await.unwrap();

        let loaded = ReviewStore::find_by_id(&store, &review.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.stars, 1);

        ReviewStore::delete(&store, &review).await.unwrap();
        assert!(ReviewStore::find_by_id(&store, &review.id)
            .await
            .unwrap()
            .is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reservations_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = JsonStore::new(dir.path()).unwrap();
            let event =
                ReservationEvent::new("r1", "alice", "bob", 9, ReservationStatus::Completed);
            ReservationEventStore::persist(&store, &event).await.unwrap();
        }

        let store = JsonStore::new(dir.path()).unwrap();
        assert!(store.can_leave_review_on_host("alice", "bob").await.unwrap());
        assert!(store
            .can_leave_review_on_accommodation("alice", 9)
            .await
            .unwrap());
        assert!(!store.can_leave_review_on_host("bob", "alice").await.unwrap());

        let event = ReservationEventStore::find_by_id(&store, "r1")
            .await
            .unwrap()
            .unwrap();
        ReservationEventStore::delete(&store, &event).await.unwrap();
        assert!(!store.can_leave_review_on_host("alice", "bob").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_during_writes_see_whole_files() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        for i in 0..20 {
            let review = Review::for_host("alice", format!("host{}", i), 5);
            ReviewStore::persist(&store, &review).await.unwrap();
        }
        let event = ReservationEvent::new("r0", "alice", "host0", 0, ReservationStatus::Completed);
        ReservationEventStore::persist(&store, &event).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 1..100i64 {
                    let host = format!("host{}", i + 20);
                    ReviewStore::persist(&store, &Review::for_host("alice", host.clone(), 4))
                        .await?;
                    let event = ReservationEvent::new(
                        format!("r{}", i),
                        "alice",
                        host,
                        i,
                        ReservationStatus::Completed,
                    );
                    ReservationEventStore::persist(&store, &event).await?;
                }
                anyhow::Ok(())
            })
        };

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    assert!(store.list_all().await?.len() >= 20);
                    assert!(store.can_leave_review_on_host("alice", "host0").await?);
                }
                anyhow::Ok(())
            })
        };

        writer.await.unwrap().unwrap();
        reader.await.unwrap().unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 119);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_stores_on_one_directory_keep_every_write() {
        let dir = tempdir().unwrap();
        let first = JsonStore::new(dir.path()).unwrap();
        let second = JsonStore::new(dir.path()).unwrap();

        let mut handles = Vec::new();
        for i in 0..100i64 {
            let store = if i % 2 == 0 { first.clone() } else { second.clone() };
            handles.push(tokio::spawn(async move {
                ReviewStore::persist(&store, &Review::for_accommodation("alice", i, 3)).await?;
                let event = ReservationEvent::new(
                    format!("r{}", i),
                    "alice",
                    "bob",
                    i,
                    ReservationStatus::Completed,
                );
                ReservationEventStore::persist(&store, &event).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(first.list_all().await.unwrap().len(), 100);
        assert_eq!(second.list_all().await.unwrap().len(), 100);
        assert_eq!(
            second
                .find_by_target(TargetType::Accommodation, "42")
                .await
                .unwrap()
                .len(),
            1
        );
        for i in 0..100i64 {
            assert!(first
                .can_leave_review_on_accommodation("alice", i)
                .await
                .unwrap());
        }
    }
}
