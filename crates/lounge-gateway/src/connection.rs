use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, trace, warn};

use lounge_db::Database;

use crate::dispatcher::Dispatcher;
use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Drive one WebSocket connection from open to close.
///
/// Outbound events are drained by a spawned task; inbound frames are handled
/// in order on this task. When either side ends, the session's disconnect
/// transition runs exactly once.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>) {
    let (mut sender, mut receiver) = socket.split();

    let (mut session, mut outbound) = Session::connect(dispatcher, db).await;
    let session_id = session.id();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };

                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Session {}: could not encode `{}`: {}", session_id, event.name(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                            warn!(
                                "Session {}: heartbeat timeout (missed {} pongs), dropping connection",
                                session_id, missed_heartbeats
                            );
                            break;
                        }
                    }
                    trace!("Session {}: ping", session_id);
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => session.handle_frame(text.as_str()).await,
                Some(Ok(Message::Binary(data))) => {
                    warn!("Session {}: ignoring {} byte binary frame", session_id, data.len());
                }
                Some(Ok(Message::Pong(_))) => pong_received.store(true, Ordering::Release),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_))) => {}
                Some(Err(e)) => {
                    debug!("Session {}: socket error: {}", session_id, e);
                    break;
                }
            },
        }
    }

    send_task.abort();
    session.disconnect().await;
}
