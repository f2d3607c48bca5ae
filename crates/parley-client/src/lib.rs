//! Feed synchronization for room message feeds.
//!
//! A feed combines paged history from a [`MessageStore`](parley_store::MessageStore)
//! with live events from an [`EventChannel`](parley_net::EventChannel) into one
//! ordered sequence. [`spawn_feed`] runs that as a tokio task; the pieces it is
//! built from ([`PageCursor`], [`FeedAssembler`], [`LiveEventRouter`],
//! [`ChatIdentity`]) are usable on their own.

pub mod assembler;
pub mod config;
pub mod cursor;
pub mod events;
pub mod feed;
pub mod identity;
pub mod router;

mod error;

pub use assembler::{FeedAssembler, FeedState};
pub use config::FeedConfig;
pub use cursor::{FeedMode, PageCursor, PageTicket};
pub use error::{FeedError, Result};
pub use events::{FeedUpdate, FetchStage};
pub use feed::{spawn_feed, FeedHandle, FeedSnapshot};
pub use identity::ChatIdentity;
pub use router::{LiveEventRouter, RouteOutcome};

use tracing_subscriber::{fmt, EnvFilter};

/// Install a fmt subscriber filtered by `RUST_LOG`. Does nothing if a global
/// subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_net=debug,parley_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
