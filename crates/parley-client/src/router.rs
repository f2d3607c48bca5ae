//! Routes live events from a room subscription into a [`FeedAssembler`].
//!
//! Events that arrive before the first page is installed are held back in
//! arrival order and replayed right after initialization. Replay skips new
//! messages that the first page already contained and counts them towards
//! the total instead.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use parley_net::{EventChannel, Subscription};
use parley_shared::protocol::LiveEvent;
use parley_shared::types::{MessageId, RoomId};

use crate::assembler::FeedAssembler;
use crate::error::Result;

/// What happened to one routed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Held back until the feed is initialized.
    Buffered,
    /// The hold-back buffer was full; the event was dropped.
    Overflowed,
    /// Appended as a new top-level message.
    Appended(MessageId),
    /// Replayed message already present in the loaded sequence.
    Duplicate(MessageId),
    /// Comment attached to a loaded parent.
    Attached { parent: MessageId, comment: MessageId },
    /// Comment whose parent is not loaded; dropped.
    Orphaned { parent: MessageId },
}

#[derive(Debug)]
pub struct LiveEventRouter {
    subscription: Option<Subscription>,
    pending: VecDeque<LiveEvent>,
    max_buffered: usize,
}

impl LiveEventRouter {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            subscription: None,
            pending: VecDeque::new(),
            max_buffered,
        }
    }

    /// Subscribe to `room`, releasing any previous subscription first.
    pub async fn connect(&mut self, channel: &dyn EventChannel, room: &RoomId) -> Result<()> {
        self.release();
        let subscription = channel.connect(room).await?;
        info!(room = %room, id = subscription.id(), "Live events connected");
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Drop the subscription and anything still held back. Returns whether a
    /// subscription was open.
    pub fn release(&mut self) -> bool {
        self.pending.clear();
        match self.subscription.take() {
            Some(subscription) => {
                info!(room = %subscription.room(), "Live events released");
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.subscription.as_ref().map(Subscription::room)
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Next event from the subscription. Never resolves while disconnected;
    /// `None` means the channel side closed, after which the router counts
    /// as disconnected. Held-back events survive the close.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let event = subscription.recv().await;
        if event.is_none() {
            warn!(room = %subscription.room(), "Live event channel closed");
            self.subscription = None;
        }
        event
    }

    pub fn route(&mut self, assembler: &mut FeedAssembler, event: LiveEvent) -> Result<RouteOutcome> {
        if !assembler.is_initialized() {
            if self.pending.len() >= self.max_buffered {
                warn!(
                    kind = event.kind().as_str(),
                    limit = self.max_buffered,
                    "Live event buffer full, dropping event"
                );
                return Ok(RouteOutcome::Overflowed);
            }
            debug!(kind = event.kind().as_str(), "Buffering live event until feed is initialized");
            self.pending.push_back(event);
            return Ok(RouteOutcome::Buffered);
        }

        apply(assembler, event, false)
    }

    /// Apply every held-back event in arrival order.
    pub fn replay(&mut self, assembler: &mut FeedAssembler) -> Result<Vec<RouteOutcome>> {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "Replaying buffered live events");
        }
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(event) = self.pending.pop_front() {
            outcomes.push(apply(assembler, event, true)?);
        }
        Ok(outcomes)
    }
}

fn apply(assembler: &mut FeedAssembler, event: LiveEvent, replaying: bool) -> Result<RouteOutcome> {
    match event {
        LiveEvent::Comment { parent, comment } => {
            let comment_id = comment.id.clone();
            if assembler.ingest_live_comment(&parent, comment)? {
                Ok(RouteOutcome::Attached {
                    parent,
                    comment: comment_id,
                })
            } else {
                Ok(RouteOutcome::Orphaned { parent })
            }
        }
        LiveEvent::NewMessage { message } => {
            let id = message.id.clone();
            if replaying && assembler.contains(&id) {
                debug!(msg_id = %id, "Buffered message already loaded, skipping");
                assembler.count_loaded_arrival()?;
                return Ok(RouteOutcome::Duplicate(id));
            }
            assembler.ingest_live_top_level(message)?;
            Ok(RouteOutcome::Appended(id))
        }
    }
}
