//! # PopMesh
//!
//! `popmesh` is a messaging layer that turns socket-level exchanges into
//! request/response calls and topic-based publish/subscribe. A node is built
//! from a capability configuration and talks to its peers through a pluggable
//! transport.
//!
//! ## Core Modules
//!
//! - `messaging`: the request, response, publish and subscription engines.
//! - `node`: the per-node facade that wires the engines to sockets.
//! - `transport`: socket traits and the in-process `MemoryHub`.
//! - `codec`: payload encoding at the transport boundary.
//! - `config`: loading node configuration from files and the environment.
//! - `utils`: shared error types and logging setup.
//!
//! ```rust
//! use popmesh::{MemoryHub, Node, NodeOptions, hook};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> popmesh::Result<()> {
//! let hub = MemoryHub::new();
//! let a = Node::connect(NodeOptions::new("a").broker("inproc://b").request(5000), &hub)?;
//! let b = Node::connect(NodeOptions::new("b").broker("inproc://b").respond(), &hub)?;
//!
//! b.create_response("foo", hook(|d: i64| d + 10))?;
//! let foo = a.create_request("foo", "b", Some(hook(|(x, y): (i64, i64)| x + y)))?;
//! assert_eq!(foo.call_as::<i64>((5, 7)).await?, 22);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod messaging;
pub mod node;
pub mod transport;
pub mod utils;

pub use messaging::{OwnerId, Registration, after, handler, hook, try_handler, try_hook};
pub use node::{Node, NodeOptions};
pub use transport::MemoryHub;
pub use utils::error::{MessagingError, Result};
