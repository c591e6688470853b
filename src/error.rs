use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the review service
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Also returned when someone other than the author deletes a review.
    #[error("review not found: {0}")]
    NotFound(Uuid),

    #[error("user {reviewer} can't leave a review for {target}")]
    CantLeaveReview { reviewer: String, target: String },

    #[error("invalid accommodation id: {0:?}")]
    InvalidTargetId(String),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
