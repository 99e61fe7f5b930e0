use lounge_types::models::RoomId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageFailure(err.to_string())
    }
}
