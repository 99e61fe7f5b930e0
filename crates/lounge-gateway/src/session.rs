use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lounge_db::{Database, StoreError};
use lounge_types::api::{CreateRoomRequest, UploadedFile};
use lounge_types::events::{ClientEvent, MediaMessage, ReactionPayload, ServerEvent};
use lounge_types::files::{FileCategory, build_file_preview, classify_file_type};
use lounge_types::models::{MessageKind, Room, RoomId};

use crate::dispatcher::{Dispatcher, SessionId};
use crate::error::SessionError;

pub const WELCOME_NOTICE: &str = "🟢 Connected to server";

pub fn join_notice(room_name: &str) -> String {
    format!("👤 A user joined room {}", room_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    InRoom(RoomId),
}

/// Coordinator for one live connection.
///
/// Owns the connection's room membership and turns each inbound event into
/// store calls plus outbound events. A failed event leaves the state exactly
/// as it was and is reported back to this session only.
pub struct Session {
    id: SessionId,
    state: SessionState,
    dispatcher: Dispatcher,
    db: Arc<Database>,
}

impl Session {
    /// Register a new session and greet it with the room list and a welcome
    /// notice.
    pub async fn connect(
        dispatcher: Dispatcher,
        db: Arc<Database>,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (id, rx) = dispatcher.register().await;
        info!("Session {} connected ({} online)", id, dispatcher.session_count().await);

        let session = Self {
            id,
            state: SessionState::Unjoined,
            dispatcher,
            db,
        };

        match session.store(|db| db.rooms.list()).await {
            Ok(rooms) => session.reply(ServerEvent::RoomsList(rooms)).await,
            Err(e) => warn!("Session {}: could not load rooms on connect: {}", id, e),
        }
        session
            .reply(ServerEvent::ChatMessage(WELCOME_NOTICE.to_string()))
            .await;

        (session, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Decode and handle one text frame. Problems are logged and reported to
    /// this session; they never end the connection.
    pub async fn handle_frame(&mut self, text: &str) {
        match ClientEvent::decode(text) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => {
                warn!(
                    "Session {} sent a bad frame: {} -- raw: {}",
                    self.id,
                    e,
                    truncate(text, 200)
                );
                self.reject(e.into()).await;
            }
        }
    }

    /// Handle a decoded event, reporting any failure to this session.
    pub async fn dispatch(&mut self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.handle(event).await {
            warn!("Session {}: dropped `{}`: {}", self.id, name, e);
            self.reject(e).await;
        }
    }

    /// Apply one event.
    pub async fn handle(&mut self, event: ClientEvent) -> Result<(), SessionError> {
        match event {
            ClientEvent::CreateRoom(req) => self.create_room(req).await,
            ClientEvent::GetRooms => {
                let rooms = self.store(|db| db.rooms.list()).await?;
                self.reply(ServerEvent::RoomsList(rooms)).await;
                Ok(())
            }
            ClientEvent::JoinRoom { room_id } => self.join_room(room_id).await,
            ClientEvent::ChatMessage(text) => self.chat_message(text).await,
            ClientEvent::Reaction(payload) => self.reaction(payload).await,
            ClientEvent::FileUploaded(file) => self.file_uploaded(file).await,
        }
    }

    /// Leave the current room, if any, and drop the session.
    pub async fn disconnect(self) {
        if let SessionState::InRoom(room_id) = self.state {
            if let Err(e) = self.store(move |db| db.rooms.leave(room_id)).await {
                warn!("Session {}: leave of room {} on disconnect failed: {}", self.id, room_id, e);
            }
            self.dispatcher.leave_group(room_id, self.id).await;
            debug!(
                "Room {}: {} sessions still listening",
                room_id,
                self.dispatcher.members(room_id).await.len()
            );
        }
        self.dispatcher.unregister(self.id).await;
        info!(
            "Session {} disconnected ({} online)",
            self.id,
            self.dispatcher.session_count().await
        );
    }

    async fn create_room(&mut self, req: CreateRoomRequest) -> Result<(), SessionError> {
        let CreateRoomRequest { name, description } = req;
        let room_name = name.clone();
        let room_id = self
            .store(move |db| db.rooms.create(&name, &description))
            .await?;

        info!("Session {} created room {} ({})", self.id, room_name, room_id);

        self.broadcast_rooms().await;
        self.reply(ServerEvent::RoomCreated(room_id)).await;
        Ok(())
    }

    /// Join first, then leave the previous room, so a failed join leaves
    /// both the store and this session untouched.
    async fn join_room(&mut self, room_id: RoomId) -> Result<(), SessionError> {
        let previous = match self.state {
            SessionState::InRoom(old) => Some(old),
            SessionState::Unjoined => None,
        };

        let room = self.store(move |db| db.rooms.join(room_id)).await?;

        if let Some(old) = previous {
            if let Err(e) = self.store(move |db| db.rooms.leave(old)).await {
                warn!("Session {}: leave of room {} failed: {}", self.id, old, e);
            }
        }
        self.dispatcher.move_group(previous, room_id, self.id).await;
        self.state = SessionState::InRoom(room_id);

        info!(
            "Session {} joined room {} ({}), {} present",
            self.id, room.name, room_id, room.user_count
        );

        self.reply(ServerEvent::RoomJoined(room.clone())).await;

        match self.store(move |db| db.messages.history(room_id)).await {
            Ok(history) => self.reply(ServerEvent::RoomHistory(history)).await,
            Err(e) => warn!("Session {}: history for room {} unavailable: {}", self.id, room_id, e),
        }

        self.announce_join(&room).await;
        self.broadcast_rooms().await;
        Ok(())
    }

    async fn announce_join(&self, room: &Room) {
        let notice = join_notice(&room.name);
        let content = notice.clone();
        let room_id = room.id;

        match self
            .store(move |db| db.messages.append(room_id, None, &MessageKind::Text, &content))
            .await
        {
            Ok(_) => {
                self.dispatcher
                    .multicast(room_id, ServerEvent::ChatMessage(notice), Some(self.id))
                    .await;
            }
            Err(e) => warn!("Session {}: join notice for room {} not saved: {}", self.id, room_id, e),
        }
    }

    async fn chat_message(&mut self, text: String) -> Result<(), SessionError> {
        let room_id = self.current_room()?;

        self.persist(room_id, MessageKind::Text, text.clone()).await?;
        let delivered = self
            .dispatcher
            .multicast(room_id, ServerEvent::ChatMessage(text), Some(self.id))
            .await;

        debug!("Session {} -> room {}: chat message to {} peers", self.id, room_id, delivered);
        Ok(())
    }

    /// Reactions are relayed but never stored.
    async fn reaction(&mut self, payload: ReactionPayload) -> Result<(), SessionError> {
        let room_id = self.current_room()?;
        self.dispatcher
            .multicast(room_id, ServerEvent::Reaction(payload), Some(self.id))
            .await;
        Ok(())
    }

    async fn file_uploaded(&mut self, file: UploadedFile) -> Result<(), SessionError> {
        let room_id = self.current_room()?;

        let category = FileCategory::from_label(&file.file_type)
            .unwrap_or_else(|| classify_file_type(&file.file_name));
        let file_size = file.file_size;

        let event = match category {
            FileCategory::Image => {
                self.persist(room_id, MessageKind::Image, file.file_url.clone()).await?;
                ServerEvent::ImageMessage(MediaMessage {
                    url: file.file_url,
                    file_name: file.file_name,
                })
            }
            FileCategory::Video => {
                self.persist(room_id, MessageKind::Video, file.file_url.clone()).await?;
                ServerEvent::VideoMessage(MediaMessage {
                    url: file.file_url,
                    file_name: file.file_name,
                })
            }
            _ => {
                let preview = build_file_preview(&file.file_url, &file.file_name);
                self.persist(room_id, MessageKind::File, preview.url.clone()).await?;
                ServerEvent::FilePreview(preview)
            }
        };

        debug!(
            "Session {} -> room {}: {} ({}, {} bytes)",
            self.id,
            room_id,
            event.name(),
            category.as_str(),
            file_size
        );

        self.dispatcher.multicast(room_id, event, Some(self.id)).await;
        Ok(())
    }

    fn current_room(&self) -> Result<RoomId, SessionError> {
        match self.state {
            SessionState::InRoom(room_id) => Ok(room_id),
            SessionState::Unjoined => Err(SessionError::NotInRoom),
        }
    }

    /// Store a message authored by this session.
    async fn persist(
        &self,
        room_id: RoomId,
        kind: MessageKind,
        content: String,
    ) -> Result<(), SessionError> {
        let author = self.id.to_string();
        self.store(move |db| db.messages.append(room_id, Some(&author), &kind, &content))
            .await?;
        Ok(())
    }

    /// Push the current room list to every session. A failed read is logged
    /// and skipped.
    async fn broadcast_rooms(&self) {
        match self.store(|db| db.rooms.list()).await {
            Ok(rooms) => self.dispatcher.broadcast(ServerEvent::RoomsList(rooms)).await,
            Err(e) => warn!("Session {}: room list broadcast skipped: {}", self.id, e),
        }
    }

    async fn reply(&self, event: ServerEvent) {
        self.dispatcher.send_to(self.id, event).await;
    }

    async fn reject(&self, err: SessionError) {
        self.reply(ServerEvent::Error {
            code: err.code(),
            message: err.to_string(),
        })
        .await;
    }

    /// Run a blocking store call off the async runtime.
    async fn store<T, F>(&self, op: F) -> Result<T, SessionError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || op(&db)).await?;
        Ok(result?)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
