use serde::Serialize;
use tokio::sync::mpsc;

use parley_shared::types::MessageId;

/// Notifications emitted by a running feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedUpdate {
    Initialized {
        total: usize,
        loaded: usize,
        exhausted: bool,
        chat_name: String,
    },
    PageLoaded {
        seq: u64,
        added: usize,
        exhausted: bool,
    },
    /// A page response arrived after a newer request had been issued.
    PageDiscarded { seq: u64 },
    MessageAppended { id: MessageId },
    CommentAttached { parent: MessageId, comment: MessageId },
    FetchFailed { stage: FetchStage, error: String },
    /// The live channel ended; the feed keeps serving history only.
    LiveChannelClosed,
}

impl FeedUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::PageLoaded { .. } => "page-loaded",
            Self::PageDiscarded { .. } => "page-discarded",
            Self::MessageAppended { .. } => "message-appended",
            Self::CommentAttached { .. } => "comment-attached",
            Self::FetchFailed { .. } => "fetch-failed",
            Self::LiveChannelClosed => "live-channel-closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    Initial,
    Page,
}

/// Hand an update to the consumer without blocking the feed task. Updates
/// are dropped when the consumer lags or has gone away.
pub fn emit_update(tx: &mpsc::Sender<FeedUpdate>, update: FeedUpdate) {
    let event = update.name();
    match tx.try_send(update) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(event, "Update queue full, dropping update");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(event, "Update receiver gone");
        }
    }
}
