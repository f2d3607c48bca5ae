//! [`MessageStore`] backed by a remote HTTP message API.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET /messages/count?room=..&limit=..&order=..` → `{"count": n}`
//! - `GET /messages?room=..&limit=..&order=..&skip=..` → JSON array of messages

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use parley_shared::types::Message;

use crate::error::{Result, StoreError};
use crate::query::MessageQuery;
use crate::store::{MessageCount, MessageStore};

/// Default request timeout for the message API.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct HttpMessageStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMessageStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &MessageQuery,
    ) -> Result<T> {
        query.validate()?;
        let url = format!("{}{path}", self.base_url);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "message API returned an error");
            return Err(StoreError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl MessageStore for HttpMessageStore {
    async fn get_message_count(&self, query: &MessageQuery) -> Result<MessageCount> {
        let count: MessageCount = self.get_json("/messages/count", query).await?;
        debug!(room = %query.room, count = count.count, "fetched message count");
        Ok(count)
    }

    async fn get_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        let messages: Vec<Message> = self.get_json("/messages", query).await?;
        debug!(
            room = %query.room,
            skip = query.skip(),
            returned = messages.len(),
            "fetched message page"
        );
        Ok(messages)
    }
}
