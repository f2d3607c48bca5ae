use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::ROOM_TOPIC_PREFIX;

// Room identity = opaque string chosen by the hosting application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn to_topic(&self) -> String {
        format!("{ROOM_TOPIC_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A top-level message in a room.
///
/// Comments are kept in arrival order. The payload is never inspected by the
/// feed core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room: RoomId,
    pub author: UserId,
    /// Display name the author used in this room
    pub chat_name: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped with the current time and a fresh id.
    pub fn new(
        room: RoomId,
        author: UserId,
        chat_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: MessageId::new(),
            room,
            author,
            chat_name: chat_name.into(),
            comments: Vec::new(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = MessageId(id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A reply attached to exactly one [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: MessageId,
    pub author: UserId,
    pub chat_name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: UserId, chat_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: MessageId::new(),
            author,
            chat_name: chat_name.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_topic() {
        assert_eq!(RoomId::new("lobby").to_topic(), "room:lobby");
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_message_json_uses_camel_case() {
        let msg = Message::new(
            RoomId::new("r1"),
            UserId::new("u1"),
            "student1",
            serde_json::json!({ "text": "hi" }),
        )
        .with_id("m1");

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["chatName"], "student1");
        assert_eq!(value["payload"]["text"], "hi");
        assert!(value["comments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_message_comments_default_when_missing() {
        let json = r#"{
            "id": "m1",
            "room": "r1",
            "author": "u1",
            "chatName": "tutor7",
            "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.comments.is_empty());
        assert!(msg.payload.is_null());
    }
}
