//! Tracking of open connections and fan-out of server events
//!
//! Each open WebSocket is represented by a [`Session`] holding the sending
//! half of that connection's outbound queue. The queue is unbounded and is
//! drained by the connection's own writer task, so pushing into it never
//! waits on the network. A queue whose connection has already gone away just
//! rejects the message, and that failure is ignored.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::ServerEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const SESSION_ID_LEN: usize = 20;

/// Generates a random alphanumeric session identifier.
pub fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

/// An open connection. Never persisted.
#[derive(Debug)]
pub struct Session {
    /// Identifier handed to the client in `initial-state`
    pub id: String,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    /// Outbound queue drained by the connection's writer task
    sender: mpsc::UnboundedSender<Message>,
}

impl Session {
    pub fn new(id: String, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Queues a frame. Returns false if the connection is already gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Registry of currently open sessions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<String, Session>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Registers a session. A session already holding the same id is replaced.
    pub fn add(&mut self, session: Session) {
        info!("Session {} connected from {}", session.id, session.addr);
        if let Some(old) = self.sessions.insert(session.id.clone(), session) {
            warn!("Session id {} was reused; dropped the older connection", old.id);
        }
    }

    /// Removes a session, returning it if it was registered.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let removed = self.sessions.remove(id);
        if let Some(session) = &removed {
            let duration = Utc::now() - session.connected_at;
            info!(
                "Session {} disconnected after {}s",
                session.id,
                duration.num_seconds()
            );
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of open connections
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sends an event to one session. Returns false if it was not delivered.
    pub fn send_to(&self, id: &str, event: &ServerEvent) -> bool {
        let Some(session) = self.sessions.get(id) else {
            return false;
        };
        match encode(event) {
            Some(message) => session.send(message),
            None => false,
        }
    }

    /// Asks every connection to close and forgets them. Returns how many
    /// there were.
    pub fn close_all(&mut self) -> usize {
        let count = self.sessions.len();
        for (_, session) in self.sessions.drain() {
            session.send(Message::Close(None));
        }
        count
    }

    /// Sends an event to every registered session and returns how many
    /// queues accepted it. A failed queue does not affect the others.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let Some(message) = encode(event) else {
            return 0;
        };

        self.sessions
            .values()
            .filter(|session| session.send(message.clone()))
            .count()
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match event.to_text() {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            error!("Failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}
