//! The `messaging` module holds the protocol engines that sit on the transport.
//!
//! - `requester`: correlated outbound requests with per-request timeouts
//! - `responder`: named request handlers that always answer
//! - `publisher`: named publish functions with optional hooks
//! - `subscriber`: per-topic handler registry with owner-based removal
//!
//! Each engine owns its state and can be driven directly; `crate::node::Node`
//! wires them to sockets.

pub mod hook;
pub mod message;
pub mod publisher;
pub mod requester;
pub mod responder;
pub mod subscriber;

pub use hook::{AfterHandler, Handler, Hook, after, handler, hook, try_handler, try_hook};
pub use message::{Envelope, RequestMessage, ResponseMessage, Sequence};
pub use publisher::{PublishFunction, Publisher};
pub use requester::{RequestFunction, Requester};
pub use responder::Responder;
pub use subscriber::{OwnerId, Registration, Subscriber};

#[cfg(test)]
mod responder_tests;
#[cfg(test)]
mod subscriber_tests;
#[cfg(test)]
mod test_support;
