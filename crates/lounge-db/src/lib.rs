pub mod error;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod rooms;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub use error::StoreError;
pub use messages::{HISTORY_LIMIT, MessageStore};
pub use rooms::RoomStore;

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Both stores over one SQLite file.
///
/// Each store owns its own connection behind its own mutex, so room
/// mutations serialize against each other and message appends serialize
/// against each other, but the two never wait on one another's lock.
pub struct Database {
    pub rooms: RoomStore,
    pub messages: MessageStore,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = connect(path)?;
        migrations::run(&conn)?;

        let rooms = RoomStore::new(conn);
        let messages = MessageStore::new(connect(path)?);

        info!("Database opened at {}", path.display());
        Ok(Self { rooms, messages })
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL so the message connection can read while rooms are being written
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    Ok(conn)
}

/// A connection that admits one operation at a time.
pub(crate) struct SerialConn {
    domain: &'static str,
    conn: Mutex<Connection>,
}

impl SerialConn {
    pub(crate) fn new(domain: &'static str, conn: Connection) -> Self {
        Self {
            domain,
            conn: Mutex::new(conn),
        }
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|e| {
            StoreError::StorageFailure(format!("{} lock poisoned: {}", self.domain, e))
        })?;
        f(&conn)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
