use std::fmt;

use serde::{Deserialize, Serialize};

pub type RoomId = i64;
pub type MessageId = i64;

/// Visibility of a room. Only public rooms exist today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    Public,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    /// Number of sessions currently joined. Never negative.
    pub user_count: u32,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// What a message's `content` holds. Text carries the literal text, the
/// media kinds carry a URL. Unrecognized kinds read back from storage are
/// kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "file" => Self::File,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub room_id: RoomId,
    /// Session that authored the message; `None` for system messages.
    #[serde(rename = "userId")]
    pub author_id: Option<String>,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl Message {
    pub fn is_system(&self) -> bool {
        self.author_id.is_none()
    }
}
