//! The live event channel contract and the scoped subscription it hands out.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use parley_shared::protocol::LiveEvent;
use parley_shared::types::RoomId;

use crate::error::NetError;
use crate::messages::decode_frame;

/// Push channel delivering live events for one room per connection.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Subscribe to `room`. Each call yields an independent subscription;
    /// events published before the call are not replayed.
    async fn connect(&self, room: &RoomId) -> Result<Subscription, NetError>;
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A registration on one room's event stream.
///
/// The registration is released when the subscription is dropped. Frames that
/// fail to decode are skipped.
pub struct Subscription {
    room: RoomId,
    id: u64,
    frames: mpsc::Receiver<Vec<u8>>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(
        room: RoomId,
        id: u64,
        frames: mpsc::Receiver<Vec<u8>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            room,
            id,
            frames,
            release: Some(Box::new(release)),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next decodable event. Returns `None` once the channel
    /// side has gone away.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        loop {
            let frame = self.frames.recv().await?;
            if let Some(event) = decode_frame(&self.room, &frame) {
                return Some(event);
            }
        }
    }
}

impl Stream for Subscription {
    type Item = LiveEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.frames.poll_recv(cx) {
                Poll::Ready(Some(frame)) => {
                    if let Some(event) = decode_frame(&this.room, &frame) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!(room = %self.room, id = self.id, "Releasing room subscription");
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("room", &self.room)
            .field("id", &self.id)
            .finish()
    }
}
