use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_shared::types::Message;

use crate::error::Result;
use crate::query::MessageQuery;

/// Body of a message count response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCount {
    pub count: u64,
}

/// Request/response access to a room's message history.
///
/// `get_messages` returns messages in the order requested by
/// [`MessageQuery::order`], after skipping `skip` messages and returning at
/// most `limit`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Total number of top-level messages in the queried room.
    async fn get_message_count(&self, query: &MessageQuery) -> Result<MessageCount>;

    /// One page of the queried room's messages.
    async fn get_messages(&self, query: &MessageQuery) -> Result<Vec<Message>>;
}
