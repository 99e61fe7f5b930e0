use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::{trace, warn};
use uuid::Uuid;

use lounge_types::events::ServerEvent;
use lounge_types::models::RoomId;

/// Events a session may have queued before further ones are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Opaque identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tracks every connected session and which room each one is listening to,
/// and fans events out to them.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<RwLock<DispatcherState>>,
}

/// Sessions and room groups share one lock so a send can never observe a
/// half-applied membership change.
#[derive(Default)]
struct DispatcherState {
    /// Outbound channel per session
    sessions: HashMap<SessionId, mpsc::Sender<ServerEvent>>,

    /// Multicast groups: room_id -> sessions currently in that room
    groups: HashMap<RoomId, HashSet<SessionId>>,
}

impl DispatcherState {
    /// Queue without waiting. A full queue means the client is not keeping
    /// up; the event is dropped for that session only.
    fn deliver(&self, session_id: &SessionId, event: ServerEvent) -> bool {
        let Some(tx) = self.sessions.get(session_id) else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Session {}: outbound queue full, dropped `{}`", session_id, event.name());
                false
            }
            // Connection is tearing down; its unregister is on the way.
            Err(TrySendError::Closed(event)) => {
                trace!("Session {}: closed, dropped `{}`", session_id, event.name());
                false
            }
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Returns its id and the receiving end of its
    /// outbound channel.
    pub async fn register(&self) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        let session_id = SessionId::new();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.inner.write().await.sessions.insert(session_id, tx);
        (session_id, rx)
    }

    /// Forget a session and drop it from every group.
    pub async fn unregister(&self, session_id: SessionId) {
        let mut state = self.inner.write().await;
        state.sessions.remove(&session_id);
        state.groups.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });
    }

    /// Once this returns, no later multicast to `room_id` reaches the session.
    pub async fn leave_group(&self, room_id: RoomId, session_id: SessionId) {
        let mut state = self.inner.write().await;
        if let Some(members) = state.groups.get_mut(&room_id) {
            members.remove(&session_id);
            if members.is_empty() {
                state.groups.remove(&room_id);
            }
        }
    }

    /// Leave `from` (if any) and join `to` as one step.
    pub async fn move_group(&self, from: Option<RoomId>, to: RoomId, session_id: SessionId) {
        let mut state = self.inner.write().await;
        if let Some(from) = from {
            if let Some(members) = state.groups.get_mut(&from) {
                members.remove(&session_id);
                if members.is_empty() {
                    state.groups.remove(&from);
                }
            }
        }
        state.groups.entry(to).or_default().insert(session_id);
    }

    /// Send an event to one session.
    pub async fn send_to(&self, session_id: SessionId, event: ServerEvent) {
        self.inner.read().await.deliver(&session_id, event);
    }

    /// Send an event to every connected session.
    pub async fn broadcast(&self, event: ServerEvent) {
        let state = self.inner.read().await;
        for session_id in state.sessions.keys() {
            state.deliver(session_id, event.clone());
        }
    }

    /// Send an event to every session in a room, optionally skipping one
    /// (normally the sender). Returns how many sessions it was queued for;
    /// sessions with a full queue are not counted.
    pub async fn multicast(
        &self,
        room_id: RoomId,
        event: ServerEvent,
        except: Option<SessionId>,
    ) -> usize {
        let state = self.inner.read().await;
        let Some(members) = state.groups.get(&room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for session_id in members.iter().filter(|id| Some(**id) != except) {
            if state.deliver(session_id, event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn members(&self, room_id: RoomId) -> Vec<SessionId> {
        self.inner
            .read()
            .await
            .groups
            .get(&room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}
