//! WebRTC signaling: point-to-point relay and the single group voice room.

use serde_json::Value;

use crate::events::{RelayFrame, SignalKind, VoiceMember};
use crate::registry::ConnectionRegistry;

/// Forwards `frame` to whoever is bound to its `recipientId`, stamped with the
/// sender's identity. Returns the number of sessions reached; zero means the
/// frame was dropped.
pub fn relay(
    registry: &ConnectionRegistry,
    kind: SignalKind,
    sender_id: &str,
    sender_name: &str,
    frame: RelayFrame,
) -> usize {
    let Some(recipient) = frame.recipient_id.filter(|id| !id.is_empty()) else {
        tracing::debug!(kind = kind.as_str(), sender = sender_id, "Signal without recipient");
        return 0;
    };

    let mut body = frame.body;
    body.insert("type".into(), Value::from(kind.as_str()));
    body.insert("recipientId".into(), Value::from(recipient.as_str()));
    body.insert("userId".into(), Value::from(sender_id));
    body.insert("username".into(), Value::from(sender_name));

    let sent = registry.send_to(&recipient, &body);
    if sent == 0 {
        tracing::debug!(
            kind = kind.as_str(),
            sender = sender_id,
            recipient = %recipient,
            "Recipient offline, signal dropped"
        );
    }
    sent
}

/// Membership of the implicit group voice room, in join order.
#[derive(Debug, Default)]
pub struct GroupVoiceRoom {
    members: Vec<VoiceMember>,
}

impl GroupVoiceRoom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or refreshes a member. Re-joining keeps the original position.
    pub fn join(&mut self, id: &str, display_name: &str) {
        match self.members.iter_mut().find(|m| m.id == id) {
            Some(member) => member.display_name = display_name.to_owned(),
            None => self.members.push(VoiceMember {
                id: id.to_owned(),
                display_name: display_name.to_owned(),
            }),
        }
    }

    pub fn leave(&mut self, id: &str) -> Option<VoiceMember> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }

    pub fn rename(&mut self, id: &str, display_name: &str) {
        if let Some(member) = self.members.iter_mut().find(|m| m.id == id) {
            member.display_name = display_name.to_owned();
        }
    }

    pub fn others(&self, id: &str) -> Vec<VoiceMember> {
        self.members.iter().filter(|m| m.id != id).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub fn invite_message(display_name: &str) -> String {
    format!("{display_name} invited you to join the live group voice session")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn frame(value: Value) -> RelayFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn relay_to_offline_recipient_sends_nothing() {
        let mut registry = ConnectionRegistry::new(16);
        let (a, mut rx) = registry.open();
        registry.bind(a, "u1");

        let sent = relay(
            &registry,
            SignalKind::Offer,
            "u1",
            "Alice",
            frame(json!({"recipientId": "ghost", "offer": {}})),
        );
        assert_eq!(sent, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn relay_forwards_body_and_stamps_sender() {
        let mut registry = ConnectionRegistry::new(16);
        let (a, _rx_a) = registry.open();
        let (b, mut rx_b) = registry.open();
        registry.bind(a, "u1");
        registry.bind(b, "u2");

        let sent = relay(
            &registry,
            SignalKind::GroupVoiceCandidate,
            "u1",
            "Alice",
            frame(json!({"recipientId": "u2", "userId": "spoofed", "candidate": {"c": 1}})),
        );
        assert_eq!(sent, 1);

        let got: Value = serde_json::from_str(rx_b.try_recv().unwrap().as_str()).unwrap();
        assert_eq!(got["type"], "groupVoiceCandidate");
        assert_eq!(got["userId"], "u1");
        assert_eq!(got["username"], "Alice");
        assert_eq!(got["candidate"], json!({"c": 1}));
    }

    #[test]
    fn room_keeps_join_order_and_excludes_self() {
        let mut room = GroupVoiceRoom::new();
        room.join("u1", "Alice");
        room.join("u2", "Bob");
        room.join("u1", "Alicia");

        let ids: Vec<_> = room.others("u3").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["u1", "u2"]);
        assert_eq!(room.others("u2")[0].display_name, "Alicia");

        assert!(room.leave("u1").is_some());
        assert!(room.leave("u1").is_none());
        assert_eq!(room.len(), 1);
        assert!(room.leave("u2").is_some());
        assert!(room.is_empty());
    }
}
