//! Page query parameters shared by every [`MessageStore`](crate::MessageStore).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use parley_shared::types::RoomId;

use crate::error::{Result, StoreError};

/// Sort direction by creation time.
///
/// Encoded on the wire as `-1` (newest first) and `1` (oldest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }
}

impl Serialize for SortOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let v = i8::deserialize(deserializer)?;
        Self::from_i8(v)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid sort order: {v}")))
    }
}

/// A request for one page of a room's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    pub room: RoomId,
    pub limit: usize,
    pub order: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
}

impl MessageQuery {
    pub fn new(room: RoomId, limit: usize, order: SortOrder) -> Self {
        Self {
            room,
            limit,
            order,
            skip: None,
        }
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.room.is_empty() {
            return Err(StoreError::InvalidQuery("room must not be empty".into()));
        }
        if self.limit == 0 {
            return Err(StoreError::InvalidQuery("limit must be positive".into()));
        }
        Ok(())
    }
}
