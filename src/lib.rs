pub mod config;
pub mod error;
pub mod locks;
pub mod models;
pub mod service;
pub mod store;

pub use config::{Config, StorageBackend, StorageConfig};
pub use error::ReviewError;
pub use models::*;
pub use service::ReviewService;
pub use store::{JsonStore, MemoryStore, PostgresStore, ReservationEventStore, ReviewStore};
