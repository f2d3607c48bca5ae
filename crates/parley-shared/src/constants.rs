/// Default number of messages fetched per page
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Topic prefix used when keying live event subscriptions by room
pub const ROOM_TOPIC_PREFIX: &str = "room:";

/// Maximum live event frame size in bytes (256 KiB)
pub const MAX_FRAME_SIZE: usize = 262_144;

/// Default capacity of the per-subscription event queue
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default number of live events held back while the first page loads
pub const DEFAULT_MAX_BUFFERED_EVENTS: usize = 1024;
