use thiserror::Error;
use tokio::task::JoinError;

use lounge_db::StoreError;
use lounge_types::events::{ErrorCode, ProtocolError};
use lounge_types::models::RoomId;

/// Why an inbound event was dropped. None of these end the connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("join a room first")]
    NotInRoom,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::StorageFailure(_) => ErrorCode::StorageFailure,
            Self::Protocol(ProtocolError::MalformedPayload { .. }) => ErrorCode::MalformedPayload,
            Self::Protocol(ProtocolError::UnknownEvent(_)) => ErrorCode::UnknownEvent,
            Self::NotInRoom => ErrorCode::NotInRoom,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(room_id) => Self::NotFound(room_id),
            StoreError::StorageFailure(reason) => Self::StorageFailure(reason),
        }
    }
}

impl From<JoinError> for SessionError {
    fn from(err: JoinError) -> Self {
        Self::StorageFailure(format!("store task failed: {}", err))
    }
}
