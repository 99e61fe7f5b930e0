use lounge_types::models::{Message, MessageId, MessageKind, RoomId};
use rusqlite::Connection;

use crate::models::{MESSAGE_COLUMNS, message_from_row};
use crate::{SerialConn, StoreError, now_millis};

/// Upper bound on the history handed back for a room. Older rows stay on
/// disk but are never returned.
pub const HISTORY_LIMIT: u32 = 50;

/// Append-only message log, one stream per room.
pub struct MessageStore {
    conn: SerialConn,
}

impl MessageStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: SerialConn::new("messages", conn),
        }
    }

    /// Room existence is not checked here; callers only append to rooms
    /// their session has joined.
    pub fn append(
        &self,
        room_id: RoomId,
        author_id: Option<&str>,
        kind: &MessageKind,
        content: &str,
    ) -> Result<MessageId, StoreError> {
        self.conn.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (room_id, kind, content, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![room_id, kind.as_str(), content, author_id, now_millis()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent [`HISTORY_LIMIT`] messages, newest first.
    pub fn history(&self, room_id: RoomId) -> Result<Vec<Message>, StoreError> {
        self.recent(room_id, HISTORY_LIMIT)
    }

    fn recent(&self, room_id: RoomId, limit: u32) -> Result<Vec<Message>, StoreError> {
        self.conn.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE room_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![room_id, limit], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Total stored messages for a room, including those past the history
    /// bound.
    #[cfg(test)]
    pub(crate) fn count(&self, room_id: RoomId) -> Result<u64, StoreError> {
        self.conn.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE room_id = ?1",
                [room_id],
                |row| row.get(0),
            )?;
            Ok(n.max(0) as u64)
        })
    }
}
