//! Types shared by every Parley crate: identifiers, the message model, the
//! live event wire protocol and the current-user abstraction.

pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use identity::{CurrentUser, IdentityProvider, StaticIdentity};
pub use protocol::{EventKind, LiveEvent};
pub use types::{Comment, Message, MessageId, RoomId, UserId};
