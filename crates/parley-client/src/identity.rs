//! Per-room display identity of the current user.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::identity::CurrentUser;
use parley_shared::types::Message;

/// The chat name the current user appears under in one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatIdentity {
    pub chat_name: String,
    /// `true` when the name was taken from the user's earlier messages
    pub reused: bool,
}

impl ChatIdentity {
    pub fn derive(messages: &[Message], user: &CurrentUser) -> Self {
        Self::derive_at(messages, user, Utc::now())
    }

    /// Reuse the chat name of the first loaded message the user authored;
    /// otherwise synthesize `<role><unix millis>`. Two first-time users with
    /// the same role in the same millisecond get the same name.
    pub fn derive_at(messages: &[Message], user: &CurrentUser, now: DateTime<Utc>) -> Self {
        match messages.iter().find(|m| m.author == user.id) {
            Some(message) => Self {
                chat_name: message.chat_name.clone(),
                reused: true,
            },
            None => Self {
                chat_name: format!("{}{}", user.role, now.timestamp_millis()),
                reused: false,
            },
        }
    }
}
