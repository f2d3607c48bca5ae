// Live event delivery for Parley feeds: the channel contract, scoped room
// subscriptions and an in-process hub keyed by room topic.

pub mod channel;
pub mod error;
pub mod hub;
pub mod messages;

pub use channel::{EventChannel, Subscription};
pub use error::NetError;
pub use hub::{spawn_hub, HubCommand, HubConfig, RoomHub};
pub use messages::{decode_frame, encode_event};
