use thiserror::Error;

use parley_net::NetError;
use parley_store::StoreError;

/// Errors produced by the feed core.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Lifecycle misuse, e.g. initializing a feed twice.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// A non-empty page arrived after every message was loaded.
    #[error("Feed exhausted: all {total} messages already loaded")]
    Exhausted { total: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event channel error: {0}")]
    Channel(#[from] NetError),

    /// The feed task is no longer running.
    #[error("Feed task stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, FeedError>;
