//! Feed configuration loaded from environment variables.
//!
//! Everything except the room has a default, so a feed can be started by
//! setting `PARLEY_ROOM` alone.

use std::sync::Arc;

use parley_shared::constants::{DEFAULT_MAX_BUFFERED_EVENTS, DEFAULT_PAGE_LIMIT};
use parley_shared::types::RoomId;
use parley_store::{HttpMessageStore, InMemoryMessageStore, MessageStore};

use crate::cursor::FeedMode;
use crate::error::{FeedError, Result};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Room whose feed is assembled.
    /// Env: `PARLEY_ROOM`
    pub room: RoomId,

    /// Env: `PARLEY_MODE` (`chat` | `comment`)
    /// Default: `chat`
    pub mode: FeedMode,

    /// Messages per page.
    /// Env: `PARLEY_PAGE_LIMIT`
    /// Default: `20`
    pub limit: usize,

    /// Base URL of the HTTP message store, if one is used.
    /// Env: `PARLEY_STORE_URL`
    pub store_url: Option<String>,

    /// Drop page responses that arrive after a newer request went out.
    /// Env: `PARLEY_DISCARD_STALE_PAGES` (true/false)
    /// Default: `true`
    pub discard_stale_pages: bool,

    /// Live events held back while the first page loads.
    /// Env: `PARLEY_MAX_BUFFERED_EVENTS`
    /// Default: `1024`
    pub max_buffered_events: usize,

    /// Capacity of the update queue handed to the consumer.
    /// Env: `PARLEY_UPDATE_CAPACITY`
    /// Default: `256`
    pub update_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            room: RoomId::new(""),
            mode: FeedMode::Chat,
            limit: DEFAULT_PAGE_LIMIT,
            store_url: None,
            discard_stale_pages: true,
            max_buffered_events: DEFAULT_MAX_BUFFERED_EVENTS,
            update_capacity: 256,
        }
    }
}

impl FeedConfig {
    pub fn new(room: RoomId, mode: FeedMode) -> Self {
        Self {
            room,
            mode,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(room) = lookup("PARLEY_ROOM") {
            config.room = RoomId::new(room.trim());
        }

        if let Some(mode) = lookup("PARLEY_MODE") {
            match mode.parse::<FeedMode>() {
                Ok(parsed) => config.mode = parsed,
                Err(e) => tracing::warn!(error = %e, "Invalid PARLEY_MODE, using default"),
            }
        }

        if let Some(n) = parse_count(&lookup, "PARLEY_PAGE_LIMIT") {
            config.limit = n;
        }

        if let Some(url) = lookup("PARLEY_STORE_URL") {
            if !url.is_empty() {
                config.store_url = Some(url);
            }
        }

        if let Some(val) = lookup("PARLEY_DISCARD_STALE_PAGES") {
            config.discard_stale_pages = val != "false" && val != "0";
        }

        if let Some(n) = parse_count(&lookup, "PARLEY_MAX_BUFFERED_EVENTS") {
            config.max_buffered_events = n;
        }

        if let Some(n) = parse_count(&lookup, "PARLEY_UPDATE_CAPACITY") {
            config.update_capacity = n;
        }

        config
    }

    /// The message store this config points at: the HTTP message API when
    /// `store_url` is set, otherwise an empty in-memory store.
    pub fn store(&self) -> Result<Arc<dyn MessageStore>> {
        match &self.store_url {
            Some(url) => {
                tracing::info!(url = %url, "Using HTTP message store");
                Ok(Arc::new(HttpMessageStore::new(url.as_str())?))
            }
            None => {
                tracing::info!("No PARLEY_STORE_URL set, using in-memory message store");
                Ok(Arc::new(InMemoryMessageStore::new()))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.room.is_empty() {
            return Err(FeedError::Config("room must not be empty".into()));
        }
        if self.limit == 0 {
            return Err(FeedError::Config("page limit must be positive".into()));
        }
        if self.update_capacity == 0 {
            return Err(FeedError::Config("update capacity must be positive".into()));
        }
        Ok(())
    }
}

fn parse_count(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let value = lookup(key)?;
    match value.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %value, "Invalid number, using default");
            None
        }
    }
}
