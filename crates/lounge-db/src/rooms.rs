use lounge_types::models::{Room, RoomId, RoomKind};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{ROOM_COLUMNS, room_from_row};
use crate::{SerialConn, StoreError, now_millis};

/// Room entities and their occupancy counters.
pub struct RoomStore {
    conn: SerialConn,
}

impl RoomStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: SerialConn::new("rooms", conn),
        }
    }

    /// Insert a public room with nobody in it.
    pub fn create(&self, name: &str, description: &str) -> Result<RoomId, StoreError> {
        self.conn.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (name, description, kind, user_count, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                rusqlite::params![name, description, RoomKind::Public.as_str(), now_millis()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Every room, oldest first.
    pub fn list(&self) -> Result<Vec<Room>, StoreError> {
        self.conn.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROOM_COLUMNS} FROM rooms ORDER BY created_at ASC, id ASC"
            ))?;
            let rooms = stmt
                .query_map([], room_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rooms)
        })
    }

    #[cfg(test)]
    pub(crate) fn get(&self, room_id: RoomId) -> Result<Option<Room>, StoreError> {
        self.conn.with_conn(|conn| query_room(conn, room_id))
    }

    /// Increment occupancy and return the post-increment snapshot.
    pub fn join(&self, room_id: RoomId) -> Result<Room, StoreError> {
        self.conn.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let updated = tx.execute(
                "UPDATE rooms SET user_count = user_count + 1 WHERE id = ?1",
                [room_id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(room_id));
            }

            let room = query_room(&tx, room_id)?.ok_or(StoreError::NotFound(room_id))?;
            tx.commit()?;
            Ok(room)
        })
    }

    /// Decrement occupancy. Leaving an empty room is a no-op.
    pub fn leave(&self, room_id: RoomId) -> Result<(), StoreError> {
        self.conn.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE rooms SET user_count = user_count - 1 WHERE id = ?1 AND user_count > 0",
                [room_id],
            )?;
            if updated == 0 && query_room(conn, room_id)?.is_none() {
                return Err(StoreError::NotFound(room_id));
            }
            Ok(())
        })
    }

    /// Zero every occupancy counter. Returns how many rooms were touched.
    pub fn reset_occupancy(&self) -> Result<usize, StoreError> {
        self.conn.with_conn(|conn| {
            Ok(conn.execute("UPDATE rooms SET user_count = 0 WHERE user_count <> 0", [])?)
        })
    }
}

fn query_room(conn: &Connection, room_id: RoomId) -> Result<Option<Room>, StoreError> {
    let room = conn
        .query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"),
            [room_id],
            room_from_row,
        )
        .optional()?;
    Ok(room)
}
