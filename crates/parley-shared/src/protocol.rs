use serde::{Deserialize, Serialize};

use crate::constants::MAX_FRAME_SIZE;
use crate::error::ProtocolError;
use crate::types::{Comment, Message, MessageId};

/// Live events pushed to a room subscription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A new top-level message was posted
    NewMessage { message: Message },

    /// A comment was attached to an existing message
    Comment { parent: MessageId, comment: Comment },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewMessage,
    Comment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::Comment => "comment",
        }
    }
}

impl LiveEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewMessage { .. } => EventKind::NewMessage,
            Self::Comment { .. } => EventKind::Comment,
        }
    }

    /// Serialize to a JSON frame
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Deserialize from a JSON frame
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(serde_json::from_slice(data)?)
    }
}
