//! In-process transport.
//!
//! `MemoryHub` plays the part of both the broker (forwarding point-to-point
//! frames between dealers by identity) and the pub/sub fabric (publisher
//! addresses with connected subscribers). Every endpoint owns an unbounded
//! channel; the hub only keeps the sending halves.
//!
//! Topic filters match by prefix, the way socket-level subscriptions do.
//! Exact topic matching is the subscription engine's job.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

use super::TransportError;
use super::channel::{BroadcastReceiver, BroadcastSender, Inbox, PointToPoint, TransportFactory};
use super::message::Frames;

#[derive(Debug)]
struct SubscriberLink {
    id: u64,
    filters: Arc<Mutex<HashSet<String>>>,
    sender: UnboundedSender<Frames>,
}

impl SubscriberLink {
    fn wants(&self, topic: &[u8]) -> bool {
        self.filters
            .lock()
            .iter()
            .any(|filter| topic.starts_with(filter.as_bytes()))
    }
}

#[derive(Debug, Default)]
struct PubEndpoint {
    bound: bool,
    subscribers: Vec<SubscriberLink>,
}

#[derive(Debug, Default)]
struct HubState {
    /// broker address -> identity -> inbox
    routes: HashMap<String, HashMap<String, UnboundedSender<Frames>>>,
    endpoints: HashMap<String, PubEndpoint>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
    next_subscriber: Arc<AtomicU64>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities currently connected to `broker_address`.
    pub fn connected(&self, broker_address: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .routes
            .get(broker_address)
            .map(|peers| peers.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl TransportFactory for MemoryHub {
    fn connect_dealer(
        &self,
        identity: &str,
        broker_address: &str,
    ) -> Result<(Arc<dyn PointToPoint>, Inbox), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            let peers = state.routes.entry(broker_address.to_string()).or_default();
            if peers.contains_key(identity) {
                return Err(TransportError::IdentityInUse(
                    identity.to_string(),
                    broker_address.to_string(),
                ));
            }
            peers.insert(identity.to_string(), tx);
        }
        debug!("{identity} connected to broker {broker_address}");

        let dealer = MemoryDealer {
            identity: identity.to_string(),
            broker_address: broker_address.to_string(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(dealer), rx))
    }

    fn bind_publisher(&self, address: &str) -> Result<Arc<dyn BroadcastSender>, TransportError> {
        {
            let mut state = self.state.lock();
            let endpoint = state.endpoints.entry(address.to_string()).or_default();
            if endpoint.bound {
                return Err(TransportError::AddressInUse(address.to_string()));
            }
            endpoint.bound = true;
        }
        debug!("publisher bound at {address}");

        Ok(Arc::new(MemoryPublisher {
            address: address.to_string(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn connect_subscriber(
        &self,
        addresses: &[String],
    ) -> Result<(Arc<dyn BroadcastReceiver>, Inbox), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let filters = Arc::new(Mutex::new(HashSet::new()));
        {
            let mut state = self.state.lock();
            // Connecting before the publisher binds is allowed.
            for address in addresses {
                state
                    .endpoints
                    .entry(address.clone())
                    .or_default()
                    .subscribers
                    .push(SubscriberLink {
                        id,
                        filters: filters.clone(),
                        sender: tx.clone(),
                    });
            }
        }

        let subscriber = MemorySubscriber {
            id,
            addresses: addresses.to_vec(),
            filters,
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(subscriber), rx))
    }
}

struct MemoryDealer {
    identity: String,
    broker_address: String,
    state: Arc<Mutex<HubState>>,
    closed: AtomicBool,
}

impl PointToPoint for MemoryDealer {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn send(&self, mut frames: Frames) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if frames.len() < 2 {
            return Err(TransportError::Malformed("missing destination frame"));
        }

        // The broker consumes the destination frame and forwards the rest.
        let destination = String::from_utf8_lossy(&frames.remove(0)).into_owned();
        let state = self.state.lock();
        let peer = state
            .routes
            .get(&self.broker_address)
            .and_then(|peers| peers.get(&destination));

        match peer {
            Some(sender) => {
                if sender.send(frames).is_err() {
                    warn!("{destination} is gone, dropping message from {}", self.identity);
                }
            }
            None => warn!(
                "no route to '{destination}' from {}, dropping message",
                self.identity
            ),
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        if let Some(peers) = state.routes.get_mut(&self.broker_address) {
            peers.remove(&self.identity);
        }
        debug!("{} disconnected from broker {}", self.identity, self.broker_address);
    }
}

struct MemoryPublisher {
    address: String,
    state: Arc<Mutex<HubState>>,
    closed: AtomicBool,
}

impl BroadcastSender for MemoryPublisher {
    fn send(&self, frames: Frames) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let topic = frames
            .first()
            .ok_or(TransportError::Malformed("missing topic frame"))?
            .clone();

        let mut state = self.state.lock();
        if let Some(endpoint) = state.endpoints.get_mut(&self.address) {
            endpoint.subscribers.retain(|link| !link.sender.is_closed());
            for link in endpoint.subscribers.iter().filter(|link| link.wants(&topic)) {
                let _ = link.sender.send(frames.clone());
            }
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        if let Some(endpoint) = state.endpoints.get_mut(&self.address) {
            endpoint.bound = false;
        }
        debug!("publisher at {} closed", self.address);
    }
}

struct MemorySubscriber {
    id: u64,
    addresses: Vec<String>,
    filters: Arc<Mutex<HashSet<String>>>,
    state: Arc<Mutex<HubState>>,
    closed: AtomicBool,
}

impl BroadcastReceiver for MemorySubscriber {
    fn subscribe(&self, topic: &str) {
        self.filters.lock().insert(topic.to_string());
    }

    fn unsubscribe(&self, topic: &str) {
        self.filters.lock().remove(topic);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.filters.lock().clear();
        let mut state = self.state.lock();
        for address in &self.addresses {
            if let Some(endpoint) = state.endpoints.get_mut(address) {
                endpoint.subscribers.retain(|link| link.id != self.id);
            }
        }
    }
}
