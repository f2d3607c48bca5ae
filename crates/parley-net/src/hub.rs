//! In-process room event hub with a tokio mpsc command pattern.
//!
//! The hub's routing table lives in a dedicated tokio task. Handles talk to it
//! through a typed command channel; each subscriber gets its own bounded frame
//! queue keyed by the room topic (`room:<id>`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use parley_shared::constants::DEFAULT_EVENT_BUFFER;
use parley_shared::protocol::LiveEvent;
use parley_shared::types::RoomId;

use crate::channel::{EventChannel, Subscription};
use crate::error::NetError;
use crate::messages::encode_event;

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// Commands sent *into* the hub task.
#[derive(Debug)]
pub enum HubCommand {
    /// Register a subscriber queue on a topic.
    Subscribe {
        topic: String,
        id: u64,
        frames: mpsc::Sender<Vec<u8>>,
        ack: oneshot::Sender<()>,
    },
    /// Remove a subscriber from a topic.
    Unsubscribe { topic: String, id: u64 },
    /// Fan a frame out to every subscriber of a topic.
    Publish { topic: String, data: Vec<u8> },
    /// Request the number of live subscribers on a topic.
    SubscriberCount {
        topic: String,
        reply: oneshot::Sender<usize>,
    },
    /// Stop the hub; every open subscription ends.
    Shutdown,
}

/// Configuration for spawning the hub.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of the command queue.
    pub command_buffer: usize,
    /// Capacity of each subscriber's frame queue. Frames published to a full
    /// queue are dropped for that subscriber.
    pub subscription_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            subscription_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Cloneable handle to a running hub.
#[derive(Debug, Clone)]
pub struct RoomHub {
    cmd_tx: mpsc::Sender<HubCommand>,
    next_id: Arc<AtomicU64>,
    config: HubConfig,
}

/// Spawn the hub in a background tokio task and return a handle to it.
pub fn spawn_hub(config: HubConfig) -> RoomHub {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(hub_loop(cmd_rx));
    info!(
        subscription_buffer = config.subscription_buffer,
        "Room event hub started"
    );

    RoomHub {
        cmd_tx,
        next_id: Arc::new(AtomicU64::new(1)),
        config,
    }
}

impl RoomHub {
    /// Publish a live event to everyone subscribed to `room`.
    pub async fn publish(&self, room: &RoomId, event: &LiveEvent) -> Result<(), NetError> {
        let data = encode_event(event)?;
        debug!(room = %room, kind = event.kind().as_str(), len = data.len(), "Publishing live event");
        self.publish_frame(room, data).await
    }

    /// Publish an already-encoded frame.
    pub async fn publish_frame(&self, room: &RoomId, data: Vec<u8>) -> Result<(), NetError> {
        self.send(HubCommand::Publish {
            topic: room.to_topic(),
            data,
        })
        .await
    }

    pub async fn subscriber_count(&self, room: &RoomId) -> Result<usize, NetError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::SubscriberCount {
            topic: room.to_topic(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| NetError::HubClosed)
    }

    pub async fn shutdown(&self) -> Result<(), NetError> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), NetError> {
        self.cmd_tx.send(cmd).await.map_err(|_| NetError::HubClosed)
    }
}

#[async_trait]
impl EventChannel for RoomHub {
    async fn connect(&self, room: &RoomId) -> Result<Subscription, NetError> {
        if room.is_empty() {
            return Err(NetError::InvalidRoom(room.to_string()));
        }

        let topic = room.to_topic();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (frames, frames_rx) = mpsc::channel(self.config.subscription_buffer);
        let (ack, ack_rx) = oneshot::channel();

        self.send(HubCommand::Subscribe {
            topic: topic.clone(),
            id,
            frames,
            ack,
        })
        .await?;
        ack_rx.await.map_err(|_| NetError::HubClosed)?;

        debug!(topic = %topic, id, "Subscribed to room topic");

        let cmd_tx = self.cmd_tx.clone();
        Ok(Subscription::new(room.clone(), id, frames_rx, move || {
            release_subscriber(cmd_tx, topic, id);
        }))
    }
}

/// Queue an `Unsubscribe` from a non-async drop path. A full queue falls back
/// to a task that waits for room; a closed hub has nothing left to unregister.
fn release_subscriber(cmd_tx: mpsc::Sender<HubCommand>, topic: String, id: u64) {
    match cmd_tx.try_send(HubCommand::Unsubscribe { topic, id }) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(cmd)) => match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(id, "Hub command queue full, deferring unsubscribe");
                runtime.spawn(async move {
                    let _ = cmd_tx.send(cmd).await;
                });
            }
            Err(_) => {
                warn!(
                    id,
                    "Hub command queue full outside a runtime, subscriber stays registered until the next publish"
                );
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn hub_loop(mut cmd_rx: mpsc::Receiver<HubCommand>) {
    let mut topics: HashMap<String, Vec<(u64, mpsc::Sender<Vec<u8>>)>> = HashMap::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            HubCommand::Subscribe {
                topic,
                id,
                frames,
                ack,
            } => {
                topics.entry(topic).or_default().push((id, frames));
                let _ = ack.send(());
            }

            HubCommand::Unsubscribe { topic, id } => {
                if let Some(subs) = topics.get_mut(&topic) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                    if subs.is_empty() {
                        topics.remove(&topic);
                    }
                }
                debug!(topic = %topic, id, "Unsubscribed from room topic");
            }

            HubCommand::Publish { topic, data } => {
                let Some(subs) = topics.get_mut(&topic) else {
                    debug!(topic = %topic, "No subscribers for topic, dropping frame");
                    continue;
                };

                subs.retain(|(id, tx)| match tx.try_send(data.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(topic = %topic, id, "Subscriber queue full, dropping frame");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(topic = %topic, id, "Pruning closed subscriber");
                        false
                    }
                });
                if subs.is_empty() {
                    topics.remove(&topic);
                }
            }

            HubCommand::SubscriberCount { topic, reply } => {
                let count = topics.get(&topic).map_or(0, Vec::len);
                let _ = reply.send(count);
            }

            HubCommand::Shutdown => {
                info!("Room event hub shutting down");
                break;
            }
        }
    }

    warn!(topics = topics.len(), "Room event hub loop ended");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_shared::types::{Message, UserId};

    use super::*;

    fn new_message(room: &str, id: &str) -> LiveEvent {
        LiveEvent::NewMessage {
            message: Message::new(RoomId::new(room), UserId::new("u1"), "s1", serde_json::Value::Null)
                .with_id(id),
        }
    }

    fn message_id(event: Option<LiveEvent>) -> Option<String> {
        match event? {
            LiveEvent::NewMessage { message } => Some(message.id.0),
            LiveEvent::Comment { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_room_subscribers_only() {
        let hub = spawn_hub(HubConfig::default());
        let lobby = RoomId::new("lobby");
        let other = RoomId::new("other");

        let mut sub = hub.connect(&lobby).await.unwrap();
        let mut other_sub = hub.connect(&other).await.unwrap();

        hub.publish(&lobby, &new_message("lobby", "m1")).await.unwrap();
        hub.publish(&other, &new_message("other", "m2")).await.unwrap();

        assert_eq!(message_id(sub.recv().await).as_deref(), Some("m1"));
        assert_eq!(message_id(other_sub.recv().await).as_deref(), Some("m2"));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unregisters() {
        let hub = spawn_hub(HubConfig::default());
        let room = RoomId::new("lobby");

        let first = hub.connect(&room).await.unwrap();
        let _second = hub.connect(&room).await.unwrap();
        assert_eq!(hub.subscriber_count(&room).await.unwrap(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(&room).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropping_subscription_with_full_queue_still_unregisters() {
        let hub = spawn_hub(HubConfig {
            command_buffer: 1,
            subscription_buffer: 4,
        });
        let room = RoomId::new("lobby");
        let sub = hub.connect(&room).await.unwrap();

        // Single-threaded runtime: the hub task cannot drain the queue until
        // this task yields, so the unsubscribe below finds it full
        let filler = hub.cmd_tx.try_send(HubCommand::Publish {
            topic: RoomId::new("other").to_topic(),
            data: Vec::new(),
        });
        assert!(filler.is_ok());
        drop(sub);

        let count = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let count = hub.subscriber_count(&room).await.unwrap();
                if count == 0 {
                    return count;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let hub = spawn_hub(HubConfig::default());
        let room = RoomId::new("lobby");
        let mut sub = hub.connect(&room).await.unwrap();

        hub.shutdown().await.unwrap();
        assert!(sub.recv().await.is_none());
        assert!(matches!(hub.connect(&room).await, Err(NetError::HubClosed)));
    }

    #[tokio::test]
    async fn test_empty_room_is_rejected() {
        let hub = spawn_hub(HubConfig::default());
        assert!(matches!(
            hub.connect(&RoomId::new("")).await,
            Err(NetError::InvalidRoom(_))
        ));
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_frames() {
        let hub = spawn_hub(HubConfig {
            command_buffer: 16,
            subscription_buffer: 1,
        });
        let room = RoomId::new("lobby");
        let mut sub = hub.connect(&room).await.unwrap();

        hub.publish(&room, &new_message("lobby", "m1")).await.unwrap();
        hub.publish(&room, &new_message("lobby", "m2")).await.unwrap();
        // Round-trip through the hub so both publishes have been processed
        assert_eq!(hub.subscriber_count(&room).await.unwrap(), 1);

        assert_eq!(message_id(sub.recv().await).as_deref(), Some("m1"));
        hub.publish(&room, &new_message("lobby", "m3")).await.unwrap();
        assert_eq!(message_id(sub.recv().await).as_deref(), Some("m3"));
    }
}
