//! Event dispatch for every connected session.
//!
//! A [`Hub`] owns all shared state behind one lock: the user directory, the
//! three bounded histories, the connection registry and the group voice room.
//! Each connection task feeds its frames in arrival order; the lock makes
//! every event atomic with respect to all others.
//!
//! ```text
//!   ws reader ──► Hub::handle_frame ──► HubState::<handler> ──► ConnectionRegistry ──► outboxes ──► ws writers
//!                                        │
//!                                        ├─ UserDirectory
//!                                        ├─ BoundedHistory × 3
//!                                        └─ GroupVoiceRoom / relay
//! ```

use std::mem;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::config::HubConfig;
use crate::directory::{Participant, UserDirectory};
use crate::events::{
    new_id, ChatEvent, ChatPayload, ClientEvent, RelayFrame, ReelPost, ServerEvent, SignalKind,
    StatusPost, ALL_RECIPIENTS,
};
use crate::history::BoundedHistory;
use crate::registry::{ConnectionRegistry, Outbox, SessionId};
use crate::signaling::{self, GroupVoiceRoom};

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("session {0} is already closed")]
    Closed(SessionId),
}

/// Connection lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Unjoined,
    Joined {
        participant_id: String,
        display_name: String,
    },
    Closed,
}

/// Per-connection handle, owned by the connection task.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    phase: SessionPhase,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn participant_id(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::Joined { participant_id, .. } => Some(participant_id),
            _ => None,
        }
    }
}

/// Identity of a joined sender, as seen by the handlers.
struct Sender<'a> {
    session: SessionId,
    id: &'a str,
    name: &'a str,
}

struct HubState {
    directory: UserDirectory,
    messages: BoundedHistory<ChatEvent>,
    statuses: BoundedHistory<StatusPost>,
    reels: BoundedHistory<ReelPost>,
    registry: ConnectionRegistry,
    voice: GroupVoiceRoom,
    status_ttl: Duration,
}

pub struct Hub {
    state: Mutex<HubState>,
    clock: Clock,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Self {
        Self::with_clock(config, Arc::new(OffsetDateTime::now_utc))
    }

    pub fn with_clock(config: &HubConfig, clock: Clock) -> Self {
        Self {
            state: Mutex::new(HubState {
                directory: UserDirectory::new(),
                messages: BoundedHistory::new(config.message_capacity),
                statuses: BoundedHistory::new(config.status_capacity),
                reels: BoundedHistory::new(config.reel_capacity),
                registry: ConnectionRegistry::new(config.outbox_capacity),
                voice: GroupVoiceRoom::new(),
                status_ttl: config.status_ttl,
            }),
            clock,
        }
    }

    /// Opens an unjoined session. Frames for it arrive on the returned outbox.
    pub async fn connect(&self) -> (Session, Outbox) {
        let (id, outbox) = self.state.lock().await.registry.open();
        tracing::debug!(session_id = id, "Session opened");
        (
            Session {
                id,
                phase: SessionPhase::Unjoined,
            },
            outbox,
        )
    }

    /// Decodes one text frame and dispatches it.
    pub async fn handle_frame(&self, session: &mut Session, frame: &str) -> Result<(), InboundError> {
        if session.phase == SessionPhase::Closed {
            return Err(InboundError::Closed(session.id));
        }
        let event: ClientEvent = serde_json::from_str(frame)?;
        self.dispatch(session, event).await;
        Ok(())
    }

    pub async fn dispatch(&self, session: &mut Session, event: ClientEvent) {
        if let ClientEvent::Unknown = event {
            tracing::warn!(session_id = session.id, "Unknown event type");
            return;
        }

        let mut state = self.state.lock().await;
        let now = (self.clock)();

        if let ClientEvent::Join {
            user_id,
            username,
            profile_pic,
        } = event
        {
            if session.phase == SessionPhase::Closed {
                return;
            }
            let joined = state.join(session.id, user_id, username, profile_pic, now);
            let previous = mem::replace(&mut session.phase, joined);
            if let SessionPhase::Joined {
                participant_id,
                display_name,
            } = previous
            {
                if session.participant_id() != Some(participant_id.as_str()) {
                    state.depart(&participant_id, &display_name);
                }
            }
            return;
        }

        let (participant_id, display_name) = match &session.phase {
            SessionPhase::Joined {
                participant_id,
                display_name,
            } => (participant_id.clone(), display_name.clone()),
            SessionPhase::Unjoined => {
                tracing::debug!(session_id = session.id, kind = event.kind(), "Event before join ignored");
                return;
            }
            SessionPhase::Closed => {
                tracing::debug!(session_id = session.id, kind = event.kind(), "Event after close ignored");
                return;
            }
        };

        let sender = Sender {
            session: session.id,
            id: &participant_id,
            name: &display_name,
        };
        if let Some(renamed) = state.apply(&sender, event, now) {
            session.phase = SessionPhase::Joined {
                participant_id,
                display_name: renamed,
            };
        }
    }

    /// Transport closed. Releases the binding and announces the departure.
    pub async fn disconnect(&self, session: &mut Session) {
        let phase = mem::replace(&mut session.phase, SessionPhase::Closed);
        if phase == SessionPhase::Closed {
            return;
        }

        let mut state = self.state.lock().await;
        state.registry.unbind(session.id);
        tracing::debug!(session_id = session.id, "Session closed");

        if let SessionPhase::Joined {
            participant_id,
            display_name,
        } = phase
        {
            state.depart(&participant_id, &display_name);
        }
    }

    pub async fn users(&self) -> Vec<Participant> {
        self.state.lock().await.directory.list_all()
    }

    pub async fn user(&self, id: &str) -> Option<Participant> {
        self.state.lock().await.directory.get(id).cloned()
    }

    pub async fn messages(&self) -> Vec<ChatEvent> {
        self.state.lock().await.messages.list()
    }

    /// Live statuses only; expired ones are swept first.
    pub async fn statuses(&self) -> Vec<StatusPost> {
        let mut state = self.state.lock().await;
        let now = (self.clock)();
        state.sweep_statuses(now);
        state.statuses.list()
    }

    pub async fn reels(&self) -> Vec<ReelPost> {
        self.state.lock().await.reels.list()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }
}

impl HubState {
    fn sweep_statuses(&mut self, now: OffsetDateTime) {
        self.statuses.sweep_expired(now, self.status_ttl);
    }

    fn join(
        &mut self,
        session: SessionId,
        user_id: Option<String>,
        username: Option<String>,
        avatar: Option<String>,
        now: OffsetDateTime,
    ) -> SessionPhase {
        self.sweep_statuses(now);

        let id = user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| new_id("user"));
        let name = non_blank(username).unwrap_or_else(|| ANONYMOUS.to_owned());

        let user = self.directory.add_or_replace(&id, &name, avatar, now);
        self.registry.bind(session, &id);

        self.registry.send_to_session(session, &ServerEvent::History {
            messages: self.messages.list(),
        });
        self.registry.send_to_session(session, &ServerEvent::StatusHistory {
            statuses: self.statuses.list(),
        });
        self.registry.send_to_session(session, &ServerEvent::ReelHistory {
            reels: self.reels.list(),
        });
        self.registry.send_to_session(session, &ServerEvent::UserList {
            users: self.directory.list_all(),
        });
        self.registry.broadcast(
            &ServerEvent::UserJoined {
                user,
                users: self.directory.list_all(),
            },
            None,
        );

        tracing::info!(
            session_id = session,
            user = %id,
            name = %name,
            online = self.directory.len(),
            "User joined"
        );

        SessionPhase::Joined {
            participant_id: id,
            display_name: name,
        }
    }

    /// Dispatch table for joined sessions. Returns the new display name when
    /// the event renamed the sender.
    fn apply(&mut self, from: &Sender<'_>, event: ClientEvent, now: OffsetDateTime) -> Option<String> {
        match event {
            ClientEvent::Message { text, recipient_id } => {
                self.chat(from, ChatPayload::Text { text }, recipient_id, now);
            }
            ClientEvent::File {
                filename,
                file_data: Some(file_data),
                recipient_id,
            } => {
                let filename = filename.unwrap_or_else(|| "file".to_owned());
                tracing::info!(user = from.id, filename = %filename, size = file_data.len(), "File received");
                self.chat(from, ChatPayload::File { filename, file_data }, recipient_id, now);
            }
            ClientEvent::Voice {
                voice_data: Some(voice_data),
                recipient_id,
            } => {
                tracing::info!(user = from.id, size = voice_data.len(), "Voice clip received");
                self.chat(from, ChatPayload::Voice { voice_data }, recipient_id, now);
            }
            ClientEvent::Status { text } => self.post_status(from, &text, now),
            ClientEvent::DeleteStatus {
                status_id: Some(status_id),
            } => self.delete_status(from, &status_id, now),
            ClientEvent::Reel {
                caption,
                filename,
                video_data: Some(video_data),
            } => self.post_reel(from, &caption, filename, video_data, now),
            ClientEvent::DeleteReel { reel_id: Some(reel_id) } => self.delete_reel(from, &reel_id),
            ClientEvent::UpdateProfile { username, profile_pic } => {
                return self.update_profile(from, username, profile_pic);
            }
            ClientEvent::Typing => self.registry.broadcast(
                &ServerEvent::UserTyping {
                    user_id: from.id.to_owned(),
                    username: from.name.to_owned(),
                },
                None,
            ),
            ClientEvent::GroupVoiceJoin => self.voice_join(from),
            ClientEvent::GroupVoiceLeave => self.voice_leave(from),
            ClientEvent::Offer(frame) => self.relay(from, SignalKind::Offer, frame),
            ClientEvent::Answer(frame) => self.relay(from, SignalKind::Answer, frame),
            ClientEvent::Candidate(frame) => self.relay(from, SignalKind::Candidate, frame),
            ClientEvent::End(frame) => self.relay(from, SignalKind::End, frame),
            ClientEvent::GroupVoiceOffer(frame) => self.relay(from, SignalKind::GroupVoiceOffer, frame),
            ClientEvent::GroupVoiceAnswer(frame) => self.relay(from, SignalKind::GroupVoiceAnswer, frame),
            ClientEvent::GroupVoiceCandidate(frame) => {
                self.relay(from, SignalKind::GroupVoiceCandidate, frame)
            }
            event => {
                tracing::debug!(user = from.id, kind = event.kind(), "Event missing required payload");
            }
        }
        None
    }

    fn chat(
        &mut self,
        from: &Sender<'_>,
        payload: ChatPayload,
        recipient_id: Option<String>,
        now: OffsetDateTime,
    ) {
        let event = ChatEvent {
            id: new_id(payload.id_prefix()),
            sender_id: from.id.to_owned(),
            sender_display_name: from.name.to_owned(),
            payload,
            recipient_id: recipient_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| ALL_RECIPIENTS.to_owned()),
            created_at: now,
        };
        self.messages.append(event.clone());

        if event.is_broadcast() {
            self.registry.broadcast(&event, None);
        } else {
            self.registry.send_to(from.id, &event);
            if event.recipient_id != from.id {
                self.registry.send_to(&event.recipient_id, &event);
            }
        }
    }

    fn post_status(&mut self, from: &Sender<'_>, text: &str, now: OffsetDateTime) {
        self.sweep_statuses(now);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let status = StatusPost {
            id: new_id("status"),
            author_id: from.id.to_owned(),
            author_display_name: from.name.to_owned(),
            avatar: self.avatar_of(from.id),
            text: text.to_owned(),
            created_at: now,
        };
        self.statuses.append(status.clone());
        tracing::info!(user = from.id, status = %status.id, "Status posted");
        self.registry.broadcast(&status, None);
    }

    fn delete_status(&mut self, from: &Sender<'_>, status_id: &str, now: OffsetDateTime) {
        self.sweep_statuses(now);
        match self.statuses.remove_owned(status_id, from.id) {
            Some(removed) => {
                tracing::info!(user = from.id, status = %removed.id, "Status deleted");
                self.registry
                    .broadcast(&ServerEvent::StatusDeleted { status_id: removed.id }, None);
            }
            None => tracing::debug!(user = from.id, status = status_id, "Status delete refused"),
        }
    }

    fn post_reel(
        &mut self,
        from: &Sender<'_>,
        caption: &str,
        filename: Option<String>,
        media: String,
        now: OffsetDateTime,
    ) {
        let reel = ReelPost {
            id: new_id("reel"),
            author_id: from.id.to_owned(),
            author_display_name: from.name.to_owned(),
            avatar: self.avatar_of(from.id),
            caption: caption.trim().to_owned(),
            filename: filename.unwrap_or_else(|| "video".to_owned()),
            media,
            created_at: now,
        };
        self.reels.append(reel.clone());
        tracing::info!(user = from.id, reel = %reel.id, size = reel.media.len(), "Reel posted");
        self.registry.broadcast(&reel, None);
    }

    fn delete_reel(&mut self, from: &Sender<'_>, reel_id: &str) {
        match self.reels.remove_owned(reel_id, from.id) {
            Some(removed) => {
                tracing::info!(user = from.id, reel = %removed.id, "Reel deleted");
                self.registry
                    .broadcast(&ServerEvent::ReelDeleted { reel_id: removed.id }, None);
            }
            None => tracing::debug!(user = from.id, reel = reel_id, "Reel delete refused"),
        }
    }

    fn update_profile(
        &mut self,
        from: &Sender<'_>,
        username: Option<String>,
        avatar: Option<Option<String>>,
    ) -> Option<String> {
        let name = non_blank(username).unwrap_or_else(|| from.name.to_owned());
        let user = self.directory.update(from.id, Some(&name), avatar)?;

        self.voice.rename(from.id, &user.display_name);
        tracing::info!(user = from.id, name = %user.display_name, "Profile updated");

        let display_name = user.display_name.clone();
        self.registry.broadcast(
            &ServerEvent::UserUpdated {
                user,
                users: self.directory.list_all(),
            },
            None,
        );
        Some(display_name)
    }

    fn voice_join(&mut self, from: &Sender<'_>) {
        self.voice.join(from.id, from.name);
        tracing::info!(user = from.id, members = self.voice.len(), "Joined group voice");

        self.registry.send_to_session(from.session, &ServerEvent::GroupVoiceState {
            users: self.voice.others(from.id),
        });
        self.registry.broadcast(
            &ServerEvent::GroupVoiceJoin {
                user_id: from.id.to_owned(),
                username: from.name.to_owned(),
            },
            Some(from.session),
        );
        self.registry.broadcast(
            &ServerEvent::GroupVoiceInvite {
                user_id: from.id.to_owned(),
                username: from.name.to_owned(),
                message: signaling::invite_message(from.name),
            },
            None,
        );
    }

    fn voice_leave(&mut self, from: &Sender<'_>) {
        if self.voice.leave(from.id).is_none() {
            return;
        }
        tracing::info!(user = from.id, members = self.voice.len(), "Left group voice");
        self.registry.broadcast(
            &ServerEvent::GroupVoiceLeave {
                user_id: from.id.to_owned(),
                username: from.name.to_owned(),
            },
            Some(from.session),
        );
    }

    fn relay(&mut self, from: &Sender<'_>, kind: SignalKind, frame: RelayFrame) {
        signaling::relay(&self.registry, kind, from.id, from.name, frame);
    }

    /// Participant `id` is gone from this session. Skipped while another
    /// open session still claims the id.
    fn depart(&mut self, id: &str, name: &str) {
        if self.registry.is_bound(id) {
            tracing::debug!(user = id, "Still connected on another session");
            return;
        }

        if self.voice.leave(id).is_some() {
            self.registry.broadcast(
                &ServerEvent::GroupVoiceLeave {
                    user_id: id.to_owned(),
                    username: name.to_owned(),
                },
                None,
            );
        }

        self.directory.remove(id);
        self.registry.broadcast(
            &ServerEvent::UserLeft {
                user_id: id.to_owned(),
                username: name.to_owned(),
                users: self.directory.list_all(),
            },
            None,
        );
        tracing::info!(user = id, name = name, online = self.directory.len(), "User left");
    }

    fn avatar_of(&self, id: &str) -> Option<String> {
        self.directory.get(id).and_then(|user| user.avatar.clone())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
