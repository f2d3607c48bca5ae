//! # parley-store
//!
//! Historical message access for Parley feeds.
//!
//! The crate defines the [`MessageStore`] contract consumed by the feed core
//! together with two implementations: an in-memory store used for embedding
//! and tests, and an HTTP client for a remote message API. Nothing here
//! persists messages; stores only serve count and page queries.

pub mod http;
pub mod memory;
pub mod query;
pub mod store;

mod error;

pub use error::{Result, StoreError};
pub use http::HttpMessageStore;
pub use memory::InMemoryMessageStore;
pub use query::{MessageQuery, SortOrder};
pub use store::{MessageCount, MessageStore};
