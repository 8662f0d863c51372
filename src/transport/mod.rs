//! The `transport` module describes the sockets the messaging layer sits on.
//!
//! A node talks to the outside world through two kinds of channel:
//! - a point-to-point, identity-addressed channel connected to a broker
//!   (requests and responses travel here)
//! - broadcast channels: a bound publisher and a subscriber connected to one
//!   or more publisher addresses, filtered by topic
//!
//! Connection management, routing by identity and in-order delivery belong to
//! the transport. `memory::MemoryHub` is an in-process implementation used by
//! the demo binary and the tests.

pub mod channel;
pub mod memory;
pub mod message;

pub use channel::{BroadcastReceiver, BroadcastSender, Inbox, PointToPoint, TransportFactory};
pub use memory::MemoryHub;
pub use message::Frames;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("identity '{0}' is already connected to {1}")]
    IdentityInUse(String, String),
    #[error("address '{0}' is already bound")]
    AddressInUse(String),
    #[error("malformed frame set: {0}")]
    Malformed(&'static str),
    #[error("channel is closed")]
    Closed,
}
