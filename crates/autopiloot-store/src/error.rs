use autopiloot_types::VideoStatus;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A concurrent writer advanced the record first; the caller should
    /// refetch and re-evaluate idempotency.
    #[error("stale state for video {video_id}: expected {expected}, found {actual}")]
    StaleState {
        video_id: String,
        expected: VideoStatus,
        actual: VideoStatus,
    },

    /// The requested transition is not on the legal progression. This is an
    /// invariant violation, not a race.
    #[error("illegal status transition for video {video_id}: {from} -> {to}")]
    InvalidTransition {
        video_id: String,
        from: VideoStatus,
        to: VideoStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_stale_state(&self) -> bool {
        matches!(self, StoreError::StaleState { .. })
    }
}
