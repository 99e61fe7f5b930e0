use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::{CreateRoomRequest, UploadedFile};
use crate::files::FilePreview;
use crate::models::{Message, Room, RoomId};

/// Opaque reaction payload, relayed as-is.
pub type ReactionPayload = Map<String, Value>;

/// Events sent FROM server TO client. Every frame is
/// `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// All rooms, oldest first
    #[serde(rename = "rooms list")]
    RoomsList(Vec<Room>),

    /// Plain text line: user chat or a system notice
    #[serde(rename = "chat message")]
    ChatMessage(String),

    /// Snapshot of the room right after this session joined it
    #[serde(rename = "room joined")]
    RoomJoined(Room),

    /// Recent messages, most recent first
    #[serde(rename = "room history")]
    RoomHistory(Vec<Message>),

    /// Id of the room this session just created
    #[serde(rename = "room created")]
    RoomCreated(RoomId),

    #[serde(rename = "reaction")]
    Reaction(ReactionPayload),

    #[serde(rename = "image message")]
    ImageMessage(MediaMessage),

    #[serde(rename = "video message")]
    VideoMessage(MediaMessage),

    #[serde(rename = "file preview")]
    FilePreview(FilePreview),

    /// The sender's last event was dropped. Only ever sent to the originating
    /// session.
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomsList(_) => "rooms list",
            Self::ChatMessage(_) => "chat message",
            Self::RoomJoined(_) => "room joined",
            Self::RoomHistory(_) => "room history",
            Self::RoomCreated(_) => "room created",
            Self::Reaction(_) => "reaction",
            Self::ImageMessage(_) => "image message",
            Self::VideoMessage(_) => "video message",
            Self::FilePreview(_) => "file preview",
            Self::Error { .. } => "error",
        }
    }
}

/// Payload of `image message` and `video message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    StorageFailure,
    MalformedPayload,
    UnknownEvent,
    NotInRoom,
}

/// Commands sent FROM client TO server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CreateRoom(CreateRoomRequest),
    GetRooms,
    JoinRoom { room_id: RoomId },
    ChatMessage(String),
    Reaction(ReactionPayload),
    FileUploaded(UploadedFile),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed `{event}` payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JoinRoomRequest {
    #[serde(rename = "roomId", deserialize_with = "lenient_room_id")]
    room_id: RoomId,
}

/// Room ids arrive as JSON numbers from some clients and as strings from
/// others.
fn lenient_room_id<'de, D>(deserializer: D) -> Result<RoomId, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Int(id) => Ok(id),
        Repr::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        Repr::Float(f) => Err(D::Error::custom(format!("room id {} is not an integer", f))),
        Repr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("room id {:?} is not an integer", s))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::MalformedPayload {
                event: "<envelope>".to_string(),
                reason: e.to_string(),
            })?;
        Self::from_parts(&envelope.event, envelope.data)
    }

    /// Decode an already split event name and payload. Space-separated
    /// names are accepted as aliases of the dashed ones.
    pub fn from_parts(event: &str, data: Value) -> Result<Self, ProtocolError> {
        let malformed = |reason: String| ProtocolError::MalformedPayload {
            event: event.to_string(),
            reason,
        };

        match event {
            "create-room" | "create room" => {
                let req: CreateRoomRequest =
                    serde_json::from_value(data).map_err(|e| malformed(e.to_string()))?;
                if req.name.trim().is_empty() {
                    return Err(malformed("room name is empty".to_string()));
                }
                Ok(Self::CreateRoom(req))
            }
            "get-rooms" | "get rooms" => Ok(Self::GetRooms),
            "join-room" | "join room" => {
                let req: JoinRoomRequest =
                    serde_json::from_value(data).map_err(|e| malformed(e.to_string()))?;
                Ok(Self::JoinRoom {
                    room_id: req.room_id,
                })
            }
            "chat-message" | "chat message" => match data {
                Value::String(text) => Ok(Self::ChatMessage(text)),
                other => Err(malformed(format!("expected a string, got {}", json_kind(&other)))),
            },
            "reaction" => match data {
                Value::Object(map) => Ok(Self::Reaction(map)),
                other => Err(malformed(format!("expected an object, got {}", json_kind(&other)))),
            },
            "file-uploaded" | "file uploaded" => serde_json::from_value(data)
                .map(Self::FileUploaded)
                .map_err(|e| malformed(e.to_string())),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create-room",
            Self::GetRooms => "get-rooms",
            Self::JoinRoom { .. } => "join-room",
            Self::ChatMessage(_) => "chat-message",
            Self::Reaction(_) => "reaction",
            Self::FileUploaded(_) => "file-uploaded",
        }
    }
}
