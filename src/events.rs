//! JSON wire vocabulary.
//!
//! Every frame is an object whose `type` field names the event. Inbound
//! frames decode into [`ClientEvent`]; everything the hub sends out is a
//! [`ServerEvent`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::directory::Participant;
use crate::history::{Authored, Timestamped};

/// Recipient value meaning "everyone".
pub const ALL_RECIPIENTS: &str = "all";

/// Kind-prefixed, time-ordered id. Unique even within one millisecond.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChatPayload {
    #[serde(rename = "message")]
    Text { text: String },
    File { filename: String, file_data: String },
    Voice { voice_data: String },
}

impl ChatPayload {
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ChatPayload::Text { .. } => "msg",
            ChatPayload::File { .. } => "file",
            ChatPayload::Voice { .. } => "voice",
        }
    }
}

/// A message, file or voice clip. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub id: String,
    #[serde(rename = "userId")]
    pub sender_id: String,
    #[serde(rename = "username")]
    pub sender_display_name: String,
    #[serde(flatten)]
    pub payload: ChatPayload,
    pub recipient_id: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ChatEvent {
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id == ALL_RECIPIENTS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "status")]
pub struct StatusPost {
    pub id: String,
    #[serde(rename = "userId")]
    pub author_id: String,
    #[serde(rename = "username")]
    pub author_display_name: String,
    #[serde(rename = "profilePic")]
    pub avatar: Option<String>,
    pub text: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Timestamped for StatusPost {
    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

impl Authored for StatusPost {
    fn id(&self) -> &str {
        &self.id
    }

    fn author_id(&self) -> &str {
        &self.author_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "reel")]
pub struct ReelPost {
    pub id: String,
    #[serde(rename = "userId")]
    pub author_id: String,
    #[serde(rename = "username")]
    pub author_display_name: String,
    #[serde(rename = "profilePic")]
    pub avatar: Option<String>,
    pub caption: String,
    pub filename: String,
    #[serde(rename = "videoData")]
    pub media: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Authored for ReelPost {
    fn id(&self) -> &str {
        &self.id
    }

    fn author_id(&self) -> &str {
        &self.author_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceMember {
    pub id: String,
    #[serde(rename = "username")]
    pub display_name: String,
}

/// Signaling frame forwarded to exactly one peer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayFrame {
    #[serde(rename = "recipientId", default)]
    pub recipient_id: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    End,
    GroupVoiceOffer,
    GroupVoiceAnswer,
    GroupVoiceCandidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
            SignalKind::End => "end",
            SignalKind::GroupVoiceOffer => "groupVoiceOffer",
            SignalKind::GroupVoiceAnswer => "groupVoiceAnswer",
            SignalKind::GroupVoiceCandidate => "groupVoiceCandidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Join {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        profile_pic: Option<String>,
    },
    Message {
        #[serde(default)]
        text: String,
        #[serde(default)]
        recipient_id: Option<String>,
    },
    File {
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        file_data: Option<String>,
        #[serde(default)]
        recipient_id: Option<String>,
    },
    Voice {
        #[serde(default)]
        voice_data: Option<String>,
        #[serde(default)]
        recipient_id: Option<String>,
    },
    Status {
        #[serde(default)]
        text: String,
    },
    DeleteStatus {
        #[serde(default)]
        status_id: Option<String>,
    },
    Reel {
        #[serde(default)]
        caption: String,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        video_data: Option<String>,
    },
    DeleteReel {
        #[serde(default)]
        reel_id: Option<String>,
    },
    UpdateProfile {
        #[serde(default)]
        username: Option<String>,
        #[serde(default, deserialize_with = "present")]
        profile_pic: Option<Option<String>>,
    },
    Typing,
    GroupVoiceJoin,
    GroupVoiceLeave,
    Offer(RelayFrame),
    Answer(RelayFrame),
    Candidate(RelayFrame),
    End(RelayFrame),
    GroupVoiceOffer(RelayFrame),
    GroupVoiceAnswer(RelayFrame),
    GroupVoiceCandidate(RelayFrame),
    #[serde(other)]
    Unknown,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Message { .. } => "message",
            ClientEvent::File { .. } => "file",
            ClientEvent::Voice { .. } => "voice",
            ClientEvent::Status { .. } => "status",
            ClientEvent::DeleteStatus { .. } => "deleteStatus",
            ClientEvent::Reel { .. } => "reel",
            ClientEvent::DeleteReel { .. } => "deleteReel",
            ClientEvent::UpdateProfile { .. } => "updateProfile",
            ClientEvent::Typing => "typing",
            ClientEvent::GroupVoiceJoin => "groupVoiceJoin",
            ClientEvent::GroupVoiceLeave => "groupVoiceLeave",
            ClientEvent::Offer(_) => "offer",
            ClientEvent::Answer(_) => "answer",
            ClientEvent::Candidate(_) => "candidate",
            ClientEvent::End(_) => "end",
            ClientEvent::GroupVoiceOffer(_) => "groupVoiceOffer",
            ClientEvent::GroupVoiceAnswer(_) => "groupVoiceAnswer",
            ClientEvent::GroupVoiceCandidate(_) => "groupVoiceCandidate",
            ClientEvent::Unknown => "unknown",
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing field (`None`).
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    History {
        messages: Vec<ChatEvent>,
    },
    StatusHistory {
        statuses: Vec<StatusPost>,
    },
    ReelHistory {
        reels: Vec<ReelPost>,
    },
    UserList {
        users: Vec<Participant>,
    },
    UserJoined {
        user: Participant,
        users: Vec<Participant>,
    },
    UserLeft {
        user_id: String,
        username: String,
        users: Vec<Participant>,
    },
    UserUpdated {
        user: Participant,
        users: Vec<Participant>,
    },
    UserTyping {
        user_id: String,
        username: String,
    },
    StatusDeleted {
        status_id: String,
    },
    ReelDeleted {
        reel_id: String,
    },
    GroupVoiceState {
        users: Vec<VoiceMember>,
    },
    GroupVoiceJoin {
        user_id: String,
        username: String,
    },
    GroupVoiceLeave {
        user_id: String,
        username: String,
    },
    GroupVoiceInvite {
        user_id: String,
        username: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_join_with_defaults() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"join"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                user_id: None,
                username: None,
                profile_pic: None
            }
        );
    }

    #[test]
    fn update_profile_tells_null_from_missing() {
        let missing: ClientEvent =
            serde_json::from_str(r#"{"type":"updateProfile","username":"x"}"#).unwrap();
        let null: ClientEvent =
            serde_json::from_str(r#"{"type":"updateProfile","profilePic":null}"#).unwrap();

        assert!(matches!(missing, ClientEvent::UpdateProfile { profile_pic: None, .. }));
        assert!(matches!(null, ClientEvent::UpdateProfile { profile_pic: Some(None), .. }));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"dance","speed":3}"#).unwrap();
        assert_eq!(event, ClientEvent::Unknown);
    }

    #[test]
    fn relay_frames_keep_their_body() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"offer","recipientId":"u2","offer":{"sdp":"v=0"},"callType":"video"}"#,
        )
        .unwrap();
        let ClientEvent::Offer(frame) = event else {
            panic!("expected offer");
        };
        assert_eq!(frame.recipient_id.as_deref(), Some("u2"));
        assert_eq!(frame.body["offer"], json!({"sdp": "v=0"}));
        assert_eq!(frame.body["callType"], "video");
    }

    #[test]
    fn chat_event_uses_client_field_names() {
        let event = ChatEvent {
            id: "file_1".into(),
            sender_id: "u1".into(),
            sender_display_name: "Alice".into(),
            payload: ChatPayload::File {
                filename: "a.txt".into(),
                file_data: "ZGF0YQ==".into(),
            },
            recipient_id: ALL_RECIPIENTS.into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["username"], "Alice");
        assert_eq!(value["fileData"], "ZGF0YQ==");
        assert_eq!(value["recipientId"], "all");
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn server_events_are_tagged() {
        let value = serde_json::to_value(ServerEvent::StatusDeleted {
            status_id: "status_1".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "statusDeleted", "statusId": "status_1"}));
    }

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = new_id("msg");
        let b = new_id("msg");
        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }
}
