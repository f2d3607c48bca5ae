use thiserror::Error;

use parley_shared::error::ProtocolError;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Event hub is shut down")]
    HubClosed,

    #[error("Invalid room: {0}")]
    InvalidRoom(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
