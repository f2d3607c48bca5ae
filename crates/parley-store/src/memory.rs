//! In-memory [`MessageStore`] keyed by room.
//!
//! Each room's messages are kept sorted by `created_at`; messages with equal
//! timestamps keep their insertion order.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use parley_shared::types::{Message, RoomId};

use crate::error::Result;
use crate::query::{MessageQuery, SortOrder};
use crate::store::{MessageCount, MessageStore};

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    rooms: RwLock<HashMap<RoomId, Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, message: Message) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(message.room.clone()).or_default();
        let at = room.partition_point(|m| m.created_at <= message.created_at);
        room.insert(at, message);
    }

    pub async fn insert_all(&self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.insert(message).await;
        }
    }

    pub async fn len(&self, room: &RoomId) -> usize {
        self.rooms.read().await.get(room).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn get_message_count(&self, query: &MessageQuery) -> Result<MessageCount> {
        query.validate()?;
        let count = self.len(&query.room).await as u64;
        tracing::debug!(room = %query.room, count, "counted messages");
        Ok(MessageCount { count })
    }

    async fn get_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        query.validate()?;
        let rooms = self.rooms.read().await;
        let Some(messages) = rooms.get(&query.room) else {
            return Ok(Vec::new());
        };

        let page: Vec<Message> = match query.order {
            SortOrder::Ascending => messages
                .iter()
                .skip(query.skip())
                .take(query.limit)
                .cloned()
                .collect(),
            SortOrder::Descending => messages
                .iter()
                .rev()
                .skip(query.skip())
                .take(query.limit)
                .cloned()
                .collect(),
        };

        tracing::debug!(
            room = %query.room,
            order = query.order.as_i8(),
            skip = query.skip(),
            returned = page.len(),
            "served message page"
        );
        Ok(page)
    }
}
