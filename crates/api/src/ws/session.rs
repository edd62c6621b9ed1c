//! Active-session registry.
//!
//! Maps a run id to the outbound channel of the currently attached client.
//! A run has at most one attached session; attaching again replaces the
//! previous attachment. Sessions exist only while a client is connected --
//! detaching removes the entry and nothing else, so the supervised process
//! keeps running and logging.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use synchub_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};

use crate::runner::events::{RunEvent, EVENT_CHANNEL_CAPACITY};
use crate::ws::frames::OutboundFrame;

/// Interval between keepalive pings on an attached session.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Metadata for a single attached session.
pub struct ActiveSession {
    /// Bounded channel sender for outbound messages to this client.
    sender: mpsc::Sender<Message>,
    /// When the client attached.
    pub connected_at: Timestamp,
}

/// Manages all attached run sessions.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<DbId, ActiveSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client to a run.
    ///
    /// Returns the receiver half of the outbound channel so the caller can
    /// forward messages to the WebSocket sink. A keepalive task pings the
    /// channel every [`KEEPALIVE_INTERVAL`] until the receiver is dropped.
    /// The channel is bounded: a client that stops draining loses frames
    /// rather than backing up the process readers.
    pub async fn attach(&self, run_id: DbId) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let keepalive_tx = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
            interval.tick().await; // first tick is immediate
            loop {
                interval.tick().await;
                match keepalive_tx.try_send(Message::Ping(Bytes::new())) {
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                    // A full buffer just skips this ping.
                    _ => {}
                }
            }
        });

        let session = ActiveSession {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        if self.sessions.write().await.insert(run_id, session).is_some() {
            tracing::debug!(run_id, "Replaced existing session attachment");
        }
        rx
    }

    /// Detach the client from a run. The supervised process is untouched.
    pub async fn detach(&self, run_id: DbId) {
        self.sessions.write().await.remove(&run_id);
    }

    /// Whether a client is currently attached to the run.
    pub async fn is_attached(&self, run_id: DbId) -> bool {
        self.sessions.read().await.contains_key(&run_id)
    }

    /// Number of attached sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Send a message to the run's attached session, if any.
    ///
    /// Returns `false` when no session is attached or the client has
    /// disconnected. A full buffer drops the message (and logs) rather
    /// than blocking the caller.
    pub async fn send_to(&self, run_id: DbId, message: Message) -> bool {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(&run_id) else {
            return false;
        };
        match session.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(run_id, "Session buffer full; dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Frame a process event and forward it to the attached session.
    ///
    /// Returns `false` if no session is attached; the event is simply not
    /// relayed (it is still in the run's log file).
    pub async fn forward(&self, run_id: DbId, event: &RunEvent) -> bool {
        let message = OutboundFrame::from_event(run_id, event).to_message();
        self.send_to(run_id, message).await
    }

    /// Send a Close frame to every attached session, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for session in sessions.values() {
            let _ = session.sender.try_send(Message::Close(None));
        }
        sessions.clear();
        tracing::info!(count, "Closed all run sessions");
    }
}
