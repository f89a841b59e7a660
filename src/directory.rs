use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

pub const PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8",
    "#F7DC6F", "#BB8FCE", "#85C1E2", "#F8B88B", "#AED6F1",
];

/// Presence record for a connected participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(rename = "username")]
    pub display_name: String,
    pub color: &'static str,
    #[serde(rename = "profilePic")]
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Who is online right now, keyed by participant id.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, Participant>,
    color_index: usize,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh participant, replacing any prior entry for `id`.
    ///
    /// Every call consumes the next palette slot, so colors depend only on
    /// how many joins came before.
    pub fn add_or_replace(
        &mut self,
        id: &str,
        display_name: &str,
        avatar: Option<String>,
        now: OffsetDateTime,
    ) -> Participant {
        let color = PALETTE[self.color_index % PALETTE.len()];
        self.color_index = self.color_index.wrapping_add(1);

        let participant = Participant {
            id: id.to_owned(),
            display_name: display_name.to_owned(),
            color,
            avatar,
            joined_at: now,
        };
        self.users.insert(id.to_owned(), participant.clone());
        participant
    }

    /// Partial update. `avatar: None` keeps the current avatar, `Some(None)` clears it.
    pub fn update(
        &mut self,
        id: &str,
        display_name: Option<&str>,
        avatar: Option<Option<String>>,
    ) -> Option<Participant> {
        let user = self.users.get_mut(id)?;
        if let Some(name) = display_name.filter(|name| !name.is_empty()) {
            user.display_name = name.to_owned();
        }
        if let Some(avatar) = avatar {
            user.avatar = avatar;
        }
        Some(user.clone())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.users.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.users.get(id)
    }

    /// Snapshot ordered by join time, then id.
    pub fn list_all(&self) -> Vec<Participant> {
        let mut users: Vec<_> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
