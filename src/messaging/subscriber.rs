//! Subscription engine
//!
//! Keeps, per topic, the handlers registered for it in registration order,
//! each tagged with an owner id. A second map indexes owners to the topics
//! they hold a handler on, so everything an owner registered can be removed
//! without walking every topic.
//!
//! Invariants kept by every operation:
//! - a topic is in the registry iff it has at least one handler, and the
//!   socket filter for it is active exactly as long
//! - an owner is in the index iff it has at least one handler
//! - an owner has at most one handler per topic
//!
//! Both maps live under one lock because they change together. Dispatch
//! copies the handler list out before running it, so handlers are free to
//! add or remove subscriptions on this engine.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::hook::{Handler, guarded};
use crate::codec::Codec;
use crate::transport::BroadcastReceiver;
use crate::transport::message::{Frames, topic_and_payload};
use crate::utils::error::{MessagingError, Result};

/// Key used to find a handler registration again. Carries no other meaning.
///
/// Ids handed out by [`Subscriber::generate_owner_id`] live apart from the
/// names callers pick, so `"0"` never matches the first generated id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnerId {
    Named(String),
    Generated(u64),
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Generated(id) => write!(f, "#{id}"),
        }
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::Named(id.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self::Named(id)
    }
}

impl From<&String> for OwnerId {
    fn from(id: &String) -> Self {
        Self::Named(id.clone())
    }
}

/// Outcome of registering a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First handler on the topic; the topic filter was activated.
    Created,
    /// Appended to a topic that already had handlers.
    Added,
}

struct Entry {
    owner: OwnerId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    topics: HashMap<String, Vec<Entry>>,
    owners: HashMap<OwnerId, HashSet<String>>,
}

impl Registry {
    fn holds(&self, owner: &OwnerId, topic: &str) -> bool {
        self.owners
            .get(owner)
            .is_some_and(|topics| topics.contains(topic))
    }

    fn unindex(&mut self, owner: &OwnerId, topic: &str) {
        if let Some(topics) = self.owners.get_mut(owner) {
            topics.remove(topic);
            if topics.is_empty() {
                self.owners.remove(owner);
            }
        }
    }
}

pub struct Subscriber {
    socket: Arc<dyn BroadcastReceiver>,
    codec: Arc<dyn Codec>,
    registry: Mutex<Registry>,
    next_owner: AtomicU64,
}

impl Subscriber {
    pub fn new(socket: Arc<dyn BroadcastReceiver>, codec: Arc<dyn Codec>) -> Self {
        Self {
            socket,
            codec,
            registry: Mutex::new(Registry::default()),
            next_owner: AtomicU64::new(0),
        }
    }

    /// Next id from this engine's counter, for callers without their own.
    pub fn generate_owner_id(&self) -> OwnerId {
        OwnerId::Generated(self.next_owner.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends `handler` to `topic` under `owner`.
    ///
    /// Fails with `DuplicateHandler`, changing nothing, when `owner` already
    /// has a handler on `topic`.
    pub fn add_handler(
        &self,
        topic: &str,
        owner: impl Into<OwnerId>,
        handler: Handler,
    ) -> Result<Registration> {
        let mut registry = self.registry.lock();
        self.register_locked(&mut registry, topic, owner.into(), handler)
    }

    /// Registers `handler` only if `topic` has no handlers yet.
    ///
    /// Returns `Ok(false)` without touching anything when it does, unless
    /// `owner` is already one of them, which is a `DuplicateHandler`.
    pub fn add_handler_to_new_topic(
        &self,
        topic: &str,
        owner: impl Into<OwnerId>,
        handler: Handler,
    ) -> Result<bool> {
        let owner = owner.into();
        let mut registry = self.registry.lock();
        if registry.holds(&owner, topic) {
            return Err(MessagingError::DuplicateHandler {
                topic: topic.to_string(),
                owner: owner.to_string(),
            });
        }
        if registry.topics.contains_key(topic) {
            return Ok(false);
        }
        self.register_locked(&mut registry, topic, owner, handler)?;
        Ok(true)
    }

    fn register_locked(
        &self,
        registry: &mut Registry,
        topic: &str,
        owner: OwnerId,
        handler: Handler,
    ) -> Result<Registration> {
        if registry.holds(&owner, topic) {
            return Err(MessagingError::DuplicateHandler {
                topic: topic.to_string(),
                owner: owner.to_string(),
            });
        }

        let outcome = if registry.topics.contains_key(topic) {
            Registration::Added
        } else {
            self.socket.subscribe(topic);
            Registration::Created
        };

        registry
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Entry {
                owner: owner.clone(),
                handler,
            });
        registry
            .owners
            .entry(owner.clone())
            .or_default()
            .insert(topic.to_string());

        debug!("{owner} subscribed to '{topic}' ({outcome:?})");
        Ok(outcome)
    }

    /// Drops every handler on `topic` and deactivates its filter.
    ///
    /// Returns how many handlers were removed; 0 when the topic was unknown.
    pub fn remove_all_handlers_with_name(&self, topic: &str) -> usize {
        let mut registry = self.registry.lock();
        let Some(entries) = registry.topics.remove(topic) else {
            return 0;
        };
        for entry in &entries {
            registry.unindex(&entry.owner, topic);
        }
        self.socket.unsubscribe(topic);

        debug!("removed {} handler(s) from '{topic}'", entries.len());
        entries.len()
    }

    /// Removes the handler `owner` registered on `topic`.
    ///
    /// Returns the number of handlers left on the topic, or `None` when
    /// there was no such registration.
    pub fn remove_handler_by_id(&self, owner: &OwnerId, topic: &str) -> Option<usize> {
        let mut registry = self.registry.lock();
        self.remove_locked(&mut registry, owner, topic)
    }

    /// Removes every handler `owner` holds and returns how many there were.
    pub fn remove_all_handlers_with_id(&self, owner: &OwnerId) -> usize {
        let mut registry = self.registry.lock();
        // Snapshot: removal edits the set being walked.
        let topics: Vec<String> = registry
            .owners
            .get(owner)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for topic in &topics {
            if self.remove_locked(&mut registry, owner, topic).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Clears the registry. Returns the number of handlers removed.
    pub fn remove_all_handlers(&self) -> usize {
        let mut registry = self.registry.lock();
        let mut removed = 0;
        for (topic, entries) in registry.topics.drain() {
            self.socket.unsubscribe(&topic);
            removed += entries.len();
        }
        registry.owners.clear();
        removed
    }

    fn remove_locked(&self, registry: &mut Registry, owner: &OwnerId, topic: &str) -> Option<usize> {
        let entries = registry.topics.get_mut(topic)?;
        let index = entries.iter().position(|entry| &entry.owner == owner)?;
        entries.remove(index);

        let left = entries.len();
        if left == 0 {
            registry.topics.remove(topic);
            self.socket.unsubscribe(topic);
        }
        registry.unindex(owner, topic);

        debug!("{owner} unsubscribed from '{topic}', {left} handler(s) left");
        Some(left)
    }

    /// Decodes a `[topic, payload]` frame set and dispatches it.
    pub fn handle_publication(&self, frames: &Frames) {
        let Some((topic, payload)) = topic_and_payload(frames) else {
            warn!("dropping malformed publication ({} frame(s))", frames.len());
            return;
        };
        match self.codec.decode(payload) {
            Ok(data) => {
                self.dispatch(&topic, &data);
            }
            Err(e) => warn!("dropping publication on '{topic}': {e}"),
        }
    }

    /// Runs every handler of `topic`, in registration order, with `data`.
    ///
    /// A failing handler is logged and does not stop the others. Returns how
    /// many handlers ran.
    pub fn dispatch(&self, topic: &str, data: &Value) -> usize {
        let handlers: Vec<(OwnerId, Handler)> = {
            let registry = self.registry.lock();
            match registry.topics.get(topic) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (entry.owner.clone(), entry.handler.clone()))
                    .collect(),
                None => return 0,
            }
        };

        for (owner, handler) in &handlers {
            if let Err(message) = guarded(|| handler(data)) {
                warn!("handler of {owner} on '{topic}' failed: {message}");
            }
        }
        handlers.len()
    }

    pub fn topics(&self) -> Vec<String> {
        self.registry.lock().topics.keys().cloned().collect()
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.registry
            .lock()
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Topics `owner` currently holds a handler on.
    pub fn owner_topics(&self, owner: &OwnerId) -> HashSet<String> {
        self.registry
            .lock()
            .owners
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    pub fn close(&self) {
        self.remove_all_handlers();
        self.socket.close();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Subscriber")
            .field("topics", &registry.topics.len())
            .field("owners", &registry.owners.len())
            .finish()
    }
}
