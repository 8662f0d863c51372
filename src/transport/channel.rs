use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use super::TransportError;
use super::message::Frames;

/// Inbound frames for one channel. Dropping every sender closes it.
pub type Inbox = UnboundedReceiver<Frames>;

/// Identity-addressed channel (a dealer connected to a broker).
pub trait PointToPoint: Send + Sync {
    fn identity(&self) -> &str;

    /// Sends `[destination, "", payload]`. Unroutable destinations are
    /// dropped by the broker, not reported here.
    fn send(&self, frames: Frames) -> Result<(), TransportError>;

    fn close(&self);
}

/// Bound publishing socket.
pub trait BroadcastSender: Send + Sync {
    fn send(&self, frames: Frames) -> Result<(), TransportError>;
    fn close(&self);
}

/// Subscribing socket; only topics with an active filter are delivered.
pub trait BroadcastReceiver: Send + Sync {
    fn subscribe(&self, topic: &str);
    fn unsubscribe(&self, topic: &str);
    fn close(&self);
}

/// Builds the sockets a node needs for its configured capabilities.
pub trait TransportFactory {
    fn connect_dealer(
        &self,
        identity: &str,
        broker_address: &str,
    ) -> Result<(Arc<dyn PointToPoint>, Inbox), TransportError>;

    fn bind_publisher(&self, address: &str) -> Result<Arc<dyn BroadcastSender>, TransportError>;

    fn connect_subscriber(
        &self,
        addresses: &[String],
    ) -> Result<(Arc<dyn BroadcastReceiver>, Inbox), TransportError>;
}
