//! Session coordinator behaviour against a real SQLite file.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;

use lounge_db::Database;
use lounge_gateway::session::{WELCOME_NOTICE, join_notice};
use lounge_gateway::{Dispatcher, Session, SessionError, SessionState};
use lounge_types::api::{CreateRoomRequest, UploadedFile};
use lounge_types::events::{ClientEvent, ErrorCode, ServerEvent};
use lounge_types::files::{FileCategory, OFFICE_VIEWER_URL};
use lounge_types::models::{MessageKind, RoomId};

struct Harness {
    dir: TempDir,
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("lounge.db")).unwrap();
        Self {
            dir,
            db: Arc::new(db),
            dispatcher: Dispatcher::new(),
        }
    }

    fn room(&self, name: &str) -> RoomId {
        self.db.rooms.create(name, "").unwrap()
    }

    fn occupancy(&self, room_id: RoomId) -> u32 {
        let rooms = self.db.rooms.list().unwrap();
        rooms.iter().find(|r| r.id == room_id).unwrap().user_count
    }

    fn stored(&self, room_id: RoomId) -> usize {
        self.db.messages.history(room_id).unwrap().len()
    }

    /// Drop a table behind the stores' backs so every later use of it fails.
    fn drop_table(&self, table: &str) {
        let conn = rusqlite::Connection::open(self.dir.path().join("lounge.db")).unwrap();
        conn.execute_batch(&format!("DROP TABLE {table}")).unwrap();
    }

    /// Connect and throw away the greeting.
    async fn connect(&self) -> (Session, Receiver<ServerEvent>) {
        let (session, mut rx) = Session::connect(self.dispatcher.clone(), self.db.clone()).await;
        drain(&mut rx);
        (session, rx)
    }

    /// Connect, join, and throw away everything received so far.
    async fn joined(&self, room_id: RoomId) -> (Session, Receiver<ServerEvent>) {
        let (mut session, mut rx) = self.connect().await;
        session.handle(ClientEvent::JoinRoom { room_id }).await.unwrap();
        drain(&mut rx);
        (session, rx)
    }
}

fn drain(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn chats(events: &[ServerEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::ChatMessage(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn upload(name: &str, url: &str, file_type: &str) -> ClientEvent {
    ClientEvent::FileUploaded(UploadedFile {
        file_name: name.to_string(),
        file_url: url.to_string(),
        file_type: file_type.to_string(),
        file_size: 1024,
    })
}

#[tokio::test]
async fn connect_sends_room_list_then_welcome() {
    let h = Harness::new();
    let general = h.room("general");

    let (session, mut rx) = Session::connect(h.dispatcher.clone(), h.db.clone()).await;
    let events = drain(&mut rx);

    assert_eq!(session.state(), SessionState::Unjoined);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], ServerEvent::RoomsList(rooms) if rooms.len() == 1 && rooms[0].id == general));
    assert_eq!(events[1], ServerEvent::ChatMessage(WELCOME_NOTICE.to_string()));
}

#[tokio::test]
async fn two_sessions_chat_in_a_room() {
    let h = Harness::new();
    let room = h.room("five");

    let (mut a, mut rx_a) = h.connect().await;
    let (mut b, mut rx_b) = h.connect().await;

    a.handle(ClientEvent::JoinRoom { room_id: room }).await.unwrap();
    let a_events = drain(&mut rx_a);
    assert!(matches!(&a_events[0], ServerEvent::RoomJoined(r) if r.id == room && r.user_count == 1));
    assert_eq!(a_events[1], ServerEvent::RoomHistory(vec![]));
    drain(&mut rx_b);

    b.handle(ClientEvent::JoinRoom { room_id: room }).await.unwrap();
    let b_events = drain(&mut rx_b);
    assert!(matches!(&b_events[0], ServerEvent::RoomJoined(r) if r.user_count == 2));
    // B sees A's join notice in its history
    assert!(matches!(&b_events[1], ServerEvent::RoomHistory(h) if h.len() == 1));
    // A is told that someone joined
    assert_eq!(chats(&drain(&mut rx_a)), [join_notice("five")]);

    assert_eq!(h.occupancy(room), 2);

    a.handle(ClientEvent::ChatMessage("hi".into())).await.unwrap();
    assert_eq!(drain(&mut rx_b), [ServerEvent::ChatMessage("hi".into())]);
    assert!(drain(&mut rx_a).is_empty());

    let history = h.db.messages.history(room).unwrap();
    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    let notice = join_notice("five");
    assert_eq!(contents, ["hi", notice.as_str(), notice.as_str()]);
    assert_eq!(history[0].kind, MessageKind::Text);
    assert_eq!(history[0].author_id, Some(a.id().to_string()));
    assert!(history[1].is_system() && history[2].is_system());
    assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn joining_a_missing_room_changes_nothing() {
    let h = Harness::new();
    let room = h.room("general");
    let (mut a, mut rx_a) = h.joined(room).await;
    let (_b, mut rx_b) = h.joined(room).await;
    drain(&mut rx_a);

    let err = a.handle(ClientEvent::JoinRoom { room_id: 999 }).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(999)));

    assert_eq!(a.state(), SessionState::InRoom(room));
    assert_eq!(h.occupancy(room), 2);
    assert_eq!(h.dispatcher.members(room).await.len(), 2);
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());
}

#[tokio::test]
async fn dropped_events_are_reported_to_the_sender_only() {
    let h = Harness::new();
    let room = h.room("general");
    let (mut a, mut rx_a) = h.connect().await;
    let (_b, mut rx_b) = h.joined(room).await;

    a.dispatch(ClientEvent::JoinRoom { room_id: 42 }).await;
    let events = drain(&mut rx_a);
    assert!(matches!(&events[..], [ServerEvent::Error { code: ErrorCode::NotFound, .. }]));
    assert_eq!(a.state(), SessionState::Unjoined);

    a.handle_frame(r#"{"event":"join-room","data":{"roomId":"nope"}}"#).await;
    let events = drain(&mut rx_a);
    assert!(matches!(&events[..], [ServerEvent::Error { code: ErrorCode::MalformedPayload, .. }]));

    a.handle_frame(r#"{"event":"teleport","data":{}}"#).await;
    let events = drain(&mut rx_a);
    assert!(matches!(&events[..], [ServerEvent::Error { code: ErrorCode::UnknownEvent, .. }]));

    assert!(drain(&mut rx_b).is_empty());
    assert_eq!(h.occupancy(room), 1);
}

#[tokio::test]
async fn switching_rooms_moves_occupancy_and_membership() {
    let h = Harness::new();
    let first = h.room("first");
    let second = h.room("second");

    let (mut a, _rx_a) = h.joined(first).await;
    let (_b, mut rx_b) = h.joined(first).await;

    a.handle(ClientEvent::JoinRoom { room_id: second }).await.unwrap();
    assert_eq!(a.state(), SessionState::InRoom(second));
    assert_eq!(h.occupancy(first), 1);
    assert_eq!(h.occupancy(second), 1);
    assert_eq!(h.dispatcher.members(first).await.len(), 1);
    assert_eq!(h.dispatcher.members(second).await, vec![a.id()]);
    drain(&mut rx_b);

    // A's chat now only goes to room two, where nobody else is
    a.handle(ClientEvent::ChatMessage("anyone?".into())).await.unwrap();
    assert!(drain(&mut rx_b).is_empty());

    // Rejoining the same room is net zero
    a.handle(ClientEvent::JoinRoom { room_id: second }).await.unwrap();
    assert_eq!(h.occupancy(second), 1);
}

#[tokio::test]
async fn disconnect_leaves_the_room_once() {
    let h = Harness::new();
    let room = h.room("general");
    let (mut a, mut rx_a) = h.joined(room).await;
    let (b, mut rx_b) = h.joined(room).await;
    assert_eq!(h.occupancy(room), 2);

    let b_id = b.id();
    b.disconnect().await;

    assert_eq!(h.occupancy(room), 1);
    assert!(!h.dispatcher.members(room).await.contains(&b_id));
    assert_eq!(h.dispatcher.session_count().await, 1);

    drain(&mut rx_b);
    drain(&mut rx_a);
    a.handle(ClientEvent::ChatMessage("still here".into())).await.unwrap();
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn chat_requires_a_room() {
    let h = Harness::new();
    let room = h.room("general");
    let (mut a, _rx_a) = h.connect().await;

    let err = a.handle(ClientEvent::ChatMessage("hello?".into())).await.unwrap_err();
    assert!(matches!(err, SessionError::NotInRoom));
    assert_eq!(h.stored(room), 0);
}

#[tokio::test]
async fn reactions_are_relayed_but_not_stored() {
    let h = Harness::new();
    let room = h.room("general");
    let (mut a, mut rx_a) = h.joined(room).await;
    let (_b, mut rx_b) = h.joined(room).await;
    drain(&mut rx_a);
    let stored = h.stored(room);

    let payload = json!({"emoji": "🎉", "messageId": 1});
    let ClientEvent::Reaction(map) = ClientEvent::from_parts("reaction", payload).unwrap() else {
        panic!("expected a reaction");
    };
    a.handle(ClientEvent::Reaction(map.clone())).await.unwrap();

    assert_eq!(drain(&mut rx_b), [ServerEvent::Reaction(map)]);
    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(h.stored(room), stored);
}

#[tokio::test]
async fn uploads_are_routed_by_category() {
    let h = Harness::new();
    let room = h.room("media");
    let (mut a, mut rx_a) = h.joined(room).await;
    let (_b, mut rx_b) = h.joined(room).await;
    drain(&mut rx_a);

    a.handle(upload("cat.png", "http://h/uploads/1.png", "image")).await.unwrap();
    a.handle(upload("clip.mov", "http://h/uploads/2.mov", "video")).await.unwrap();
    a.handle(upload("paper.pdf", "http://h/uploads/3.pdf", "pdf")).await.unwrap();
    a.handle(upload("sheet.xlsx", "http://h/uploads/4.xlsx", "spreadsheet")).await.unwrap();
    // Unknown label falls back to the file name
    a.handle(upload("pic.JPG", "http://h/uploads/5.jpg", "application/octet-stream")).await.unwrap();

    let events = drain(&mut rx_b);
    assert_eq!(events.len(), 5);
    assert!(matches!(&events[0], ServerEvent::ImageMessage(m) if m.url == "http://h/uploads/1.png" && m.file_name == "cat.png"));
    assert!(matches!(&events[1], ServerEvent::VideoMessage(m) if m.file_name == "clip.mov"));
    match &events[2] {
        ServerEvent::FilePreview(p) => {
            assert_eq!(p.file_type, FileCategory::Pdf);
            assert_eq!(p.viewer_url, "http://h/uploads/3.pdf");
            assert_eq!(p.message_text, "paper.pdf");
        }
        other => panic!("expected a file preview, got {other:?}"),
    }
    match &events[3] {
        ServerEvent::FilePreview(p) => {
            assert_eq!(p.file_type, FileCategory::Spreadsheet);
            assert_eq!(p.viewer_url, format!("{}http://h/uploads/4.xlsx", OFFICE_VIEWER_URL));
        }
        other => panic!("expected a file preview, got {other:?}"),
    }
    assert!(matches!(&events[4], ServerEvent::ImageMessage(_)));
    assert!(drain(&mut rx_a).is_empty());

    let kinds: Vec<_> = h
        .db
        .messages
        .history(room)
        .unwrap()
        .into_iter()
        .filter(|m| !m.is_system())
        .map(|m| (m.kind, m.content))
        .collect();
    assert_eq!(
        kinds,
        [
            (MessageKind::Image, "http://h/uploads/5.jpg".to_string()),
            (MessageKind::File, "http://h/uploads/4.xlsx".to_string()),
            (MessageKind::File, "http://h/uploads/3.pdf".to_string()),
            (MessageKind::Video, "http://h/uploads/2.mov".to_string()),
            (MessageKind::Image, "http://h/uploads/1.png".to_string()),
        ]
    );
}

#[tokio::test]
async fn creating_a_room_updates_everyone() {
    let h = Harness::new();
    let (mut a, mut rx_a) = h.connect().await;
    let (_b, mut rx_b) = h.connect().await;

    a.handle(ClientEvent::CreateRoom(CreateRoomRequest {
        name: "lobby".into(),
        description: "first room".into(),
    }))
    .await
    .unwrap();

    let a_events = drain(&mut rx_a);
    let b_events = drain(&mut rx_b);

    let room_id = match &a_events[..] {
        [ServerEvent::RoomsList(rooms), ServerEvent::RoomCreated(id)] => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].description, "first room");
            *id
        }
        other => panic!("unexpected events {other:?}"),
    };
    assert!(matches!(&b_events[..], [ServerEvent::RoomsList(rooms)] if rooms[0].id == room_id));
    assert_eq!(h.occupancy(room_id), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_keep_occupancy_consistent() {
    let h = Harness::new();
    let room = h.room("busy");

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let dispatcher = h.dispatcher.clone();
            let db = h.db.clone();
            tokio::spawn(async move {
                let (mut session, _rx) = Session::connect(dispatcher, db).await;
                session.handle(ClientEvent::JoinRoom { room_id: room }).await.unwrap();
                session.handle(ClientEvent::ChatMessage("hey".into())).await.unwrap();
                session
            })
        })
        .collect();

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.unwrap());
    }
    assert_eq!(h.occupancy(room), 12);
    assert_eq!(h.dispatcher.members(room).await.len(), 12);

    for session in sessions.drain(..6) {
        session.disconnect().await;
    }
    assert_eq!(h.occupancy(room), 6);
    assert_eq!(h.dispatcher.members(room).await.len(), 6);
    assert_eq!(h.stored(room), 24);
}

#[tokio::test]
async fn failed_persist_is_not_broadcast() {
    let h = Harness::new();
    let room = h.room("general");
    let (mut a, mut rx_a) = h.joined(room).await;
    let (_b, mut rx_b) = h.joined(room).await;
    drain(&mut rx_a);

    h.drop_table("messages");

    let err = a.handle(ClientEvent::ChatMessage("hi".into())).await.unwrap_err();
    assert!(matches!(err, SessionError::StorageFailure(_)));

    let err = a
        .handle(upload("cat.png", "http://h/uploads/1.png", "image"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::StorageFailure(_)));

    assert!(drain(&mut rx_b).is_empty());
    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(a.state(), SessionState::InRoom(room));
    assert_eq!(h.occupancy(room), 2);

    // Only the sender hears about it
    a.dispatch(ClientEvent::ChatMessage("again".into())).await;
    assert!(matches!(
        &drain(&mut rx_a)[..],
        [ServerEvent::Error { code: ErrorCode::StorageFailure, .. }]
    ));
    assert!(drain(&mut rx_b).is_empty());
}

#[tokio::test]
async fn failed_join_changes_nothing() {
    let h = Harness::new();
    let first = h.room("first");
    let second = h.room("second");
    let (mut a, mut rx_a) = h.joined(first).await;
    let (_b, mut rx_b) = h.joined(first).await;
    drain(&mut rx_a);

    h.drop_table("rooms");

    let err = a.handle(ClientEvent::JoinRoom { room_id: second }).await.unwrap_err();
    assert!(matches!(err, SessionError::StorageFailure(_)));

    assert_eq!(a.state(), SessionState::InRoom(first));
    assert!(h.dispatcher.members(first).await.contains(&a.id()));
    assert!(h.dispatcher.members(second).await.is_empty());
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());

    // Chat in the old room still works since messages are untouched
    a.handle(ClientEvent::ChatMessage("still here".into())).await.unwrap();
    assert_eq!(drain(&mut rx_b), [ServerEvent::ChatMessage("still here".into())]);
}
