//! Live transport sessions and the participant each one is bound to.
//!
//! Nothing else in the crate writes to a socket. Each session owns a bounded
//! outbox drained by its connection's writer task. Pushing a frame never
//! blocks: a full outbox drops the frame, a vanished peer only costs a failed
//! `try_send`.

use std::collections::BTreeMap;

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

pub type SessionId = u64;
pub type Outbox = mpsc::Receiver<Utf8Bytes>;

#[derive(Debug)]
struct Connection {
    tx: mpsc::Sender<Utf8Bytes>,
    participant: Option<String>,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: BTreeMap<SessionId, Connection>,
    next_id: SessionId,
    outbox_capacity: usize,
}

impl ConnectionRegistry {
    /// `outbox_capacity` must be non-zero.
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 0,
            outbox_capacity,
        }
    }

    /// Registers a new unbound session and hands back the receiving end of its outbox.
    pub fn open(&mut self) -> (SessionId, Outbox) {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        self.next_id += 1;
        let id = self.next_id;
        self.connections.insert(
            id,
            Connection {
                tx,
                participant: None,
            },
        );
        (id, rx)
    }

    pub fn bind(&mut self, session: SessionId, participant_id: &str) {
        if let Some(conn) = self.connections.get_mut(&session) {
            conn.participant = Some(participant_id.to_owned());
        }
    }

    /// Forgets the session entirely; returns the id it was bound to.
    pub fn unbind(&mut self, session: SessionId) -> Option<String> {
        self.connections.remove(&session)?.participant
    }

    pub fn is_open(&self, session: SessionId) -> bool {
        self.connections.contains_key(&session)
    }

    pub fn is_bound(&self, participant_id: &str) -> bool {
        self.connections
            .values()
            .any(|conn| conn.participant.as_deref() == Some(participant_id))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Visits every open session claiming `participant_id`. There may be several.
    pub fn for_each_bound_to(&self, participant_id: &str, mut f: impl FnMut(SessionId)) {
        for (id, conn) in &self.connections {
            if conn.participant.as_deref() == Some(participant_id) {
                f(*id);
            }
        }
    }

    pub fn send_to_session<T: Serialize>(&self, session: SessionId, message: &T) {
        let Some(frame) = encode(message) else {
            return;
        };
        self.push(session, frame);
    }

    /// Best effort delivery to every session bound to `participant_id`.
    /// Returns how many sessions were addressed.
    pub fn send_to<T: Serialize>(&self, participant_id: &str, message: &T) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };
        let mut sent = 0;
        self.for_each_bound_to(participant_id, |session| {
            self.push(session, frame.clone());
            sent += 1;
        });
        sent
    }

    /// Sends to every open session, bound or not, except `exclude`.
    pub fn broadcast<T: Serialize>(&self, message: &T, exclude: Option<SessionId>) {
        let Some(frame) = encode(message) else {
            return;
        };
        let targets: Vec<SessionId> = self
            .connections
            .keys()
            .copied()
            .filter(|id| Some(*id) != exclude)
            .collect();
        for session in targets {
            self.push(session, frame.clone());
        }
    }

    fn push(&self, session: SessionId, frame: Utf8Bytes) {
        let Some(conn) = self.connections.get(&session) else {
            return;
        };
        match conn.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session_id = session, "Outbox full, frame dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(session_id = session, "Dropped frame for closed session");
            }
        }
    }
}

fn encode<T: Serialize>(message: &T) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outbound frame");
            None
        }
    }
}
