use tracing::{debug, warn};

use parley_shared::protocol::LiveEvent;
use parley_shared::types::RoomId;

use crate::error::NetError;

pub fn encode_event(event: &LiveEvent) -> Result<Vec<u8>, NetError> {
    Ok(event.to_bytes()?)
}

/// Decode a frame received on `room`, logging and discarding frames that are
/// not valid live events or that carry a message for another room.
pub fn decode_frame(room: &RoomId, data: &[u8]) -> Option<LiveEvent> {
    let event = match LiveEvent::from_bytes(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(room = %room, len = data.len(), error = %e, "Failed to decode live event frame");
            return None;
        }
    };

    if let LiveEvent::NewMessage { message } = &event {
        if &message.room != room {
            debug!(
                room = %room,
                message_room = %message.room,
                msg_id = %message.id,
                "Ignoring message addressed to another room"
            );
            return None;
        }
    }

    Some(event)
}
