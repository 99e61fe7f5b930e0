//! Row mapping between SQLite and the shared domain types.

use lounge_types::models::{Message, MessageKind, Room, RoomKind};
use rusqlite::Row;
use tracing::warn;

pub(crate) const ROOM_COLUMNS: &str = "id, name, description, kind, user_count, created_at";
pub(crate) const MESSAGE_COLUMNS: &str = "id, room_id, kind, content, author_id, created_at";

pub(crate) fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(3)?;
    let user_count: i64 = row.get(4)?;

    Ok(Room {
        id,
        name: row.get(1)?,
        description: row.get(2)?,
        kind: RoomKind::parse(&kind).unwrap_or_else(|| {
            warn!("Room {} has unknown kind '{}', treating as public", id, kind);
            RoomKind::default()
        }),
        user_count: u32::try_from(user_count.max(0)).unwrap_or(u32::MAX),
        created_at: row.get(5)?,
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        room_id: row.get(1)?,
        kind: MessageKind::from(row.get::<_, String>(2)?),
        content: row.get(3)?,
        author_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}
