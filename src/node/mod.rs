//! Node facade
//!
//! A `Node` owns the sockets and engines for the capabilities it was built
//! with and exposes one create/remove surface per capability:
//! - point-to-point (`request`, `respond`): one dealer channel shared by the
//!   request and response engines
//! - `publish`: a bound broadcast socket
//! - `subscribe`: a broadcast receiver connected to the upstream publishers
//!
//! Names are unique per kind: creating a request, response or publish
//! function under a taken name fails with `DuplicateName` and leaves the
//! existing one alone. Using a capability the node was not built with fails
//! with `Configuration`.
//!
//! Inbound traffic is handled by one task per socket, spawned at connect
//! time. `Node::connect` must therefore run inside a tokio runtime.

mod options;

pub use options::{NodeOptions, PublishOptions, RequestOptions, SubscribeOptions};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{Codec, JsonCodec};
use crate::messaging::{
    AfterHandler, Envelope, Handler, Hook, OwnerId, PublishFunction, Publisher, Registration,
    RequestFunction, Requester, Responder, Subscriber,
};
use crate::transport::message::payload;
use crate::transport::{Inbox, PointToPoint, TransportFactory};
use crate::utils::error::{MessagingError, Result};

struct RequestCapability {
    requester: Arc<Requester>,
    functions: Mutex<HashMap<String, RequestFunction>>,
}

struct ResponseCapability {
    responder: Arc<Responder>,
    names: Mutex<HashSet<String>>,
}

struct PublishCapability {
    publisher: Publisher,
    functions: Mutex<HashMap<String, PublishFunction>>,
}

struct NodeInner {
    identity: String,
    codec: Arc<dyn Codec>,
    dealer: Option<Arc<dyn PointToPoint>>,
    requests: Option<RequestCapability>,
    responses: Option<ResponseCapability>,
    publications: Option<PublishCapability>,
    subscriber: Option<Arc<Subscriber>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Handle to a messaging node. Clones share the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Builds a node with the default JSON codec.
    pub fn connect(options: NodeOptions, transport: &dyn TransportFactory) -> Result<Self> {
        Self::connect_with_codec(options, transport, Arc::new(JsonCodec))
    }

    pub fn connect_with_codec(
        options: NodeOptions,
        transport: &dyn TransportFactory,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        let point_to_point = options
            .point_to_point()
            .map_err(MessagingError::Configuration)?;
        if let Some(subscribe) = &options.subscribe {
            if subscribe.upstream_addresses.is_empty() {
                return Err(MessagingError::Configuration(
                    "subscribing needs at least one upstream publish address".to_string(),
                ));
            }
        }

        let identity = options
            .transport_identity
            .clone()
            .unwrap_or_else(|| format!("node-{}", uuid::Uuid::new_v4()));

        // A failure closes whatever was already opened.
        let publish_socket = match &options.publish {
            Some(publish) => Some(transport.bind_publisher(&publish.bind_address)?),
            None => None,
        };
        let subscribe_socket = match &options.subscribe {
            Some(subscribe) => match transport.connect_subscriber(&subscribe.upstream_addresses) {
                Ok(socket) => Some(socket),
                Err(e) => {
                    if let Some(socket) = &publish_socket {
                        socket.close();
                    }
                    return Err(e.into());
                }
            },
            None => None,
        };
        let dealer_socket = match point_to_point {
            Some((identity, broker)) => match transport.connect_dealer(identity, broker) {
                Ok(socket) => Some(socket),
                Err(e) => {
                    if let Some(socket) = &publish_socket {
                        socket.close();
                    }
                    if let Some((socket, _)) = &subscribe_socket {
                        socket.close();
                    }
                    return Err(e.into());
                }
            },
            None => None,
        };

        let mut tasks = Vec::new();
        let mut dealer = None;
        let mut requests = None;
        let mut responses = None;
        if let Some((channel, inbox)) = dealer_socket {
            let requester = options.request.as_ref().map(|request| {
                Arc::new(Requester::new(
                    channel.clone(),
                    codec.clone(),
                    Duration::from_millis(request.timeout_ms),
                ))
            });
            let responder = options
                .respond
                .then(|| Arc::new(Responder::new(channel.clone(), codec.clone())));

            tasks.push(spawn_point_to_point_loop(
                identity.clone(),
                inbox,
                codec.clone(),
                requester.clone(),
                responder.clone(),
            ));

            requests = requester.map(|requester| RequestCapability {
                requester,
                functions: Mutex::new(HashMap::new()),
            });
            responses = responder.map(|responder| ResponseCapability {
                responder,
                names: Mutex::new(HashSet::new()),
            });
            dealer = Some(channel);
        }

        let publications = publish_socket.map(|socket| PublishCapability {
            publisher: Publisher::new(socket),
            functions: Mutex::new(HashMap::new()),
        });

        let subscriber = subscribe_socket.map(|(socket, inbox)| {
            let subscriber = Arc::new(Subscriber::new(socket, codec.clone()));
            tasks.push(spawn_subscription_loop(
                identity.clone(),
                inbox,
                subscriber.clone(),
            ));
            subscriber
        });

        info!(
            "node {identity} up (request: {}, respond: {}, publish: {}, subscribe: {})",
            requests.is_some(),
            responses.is_some(),
            publications.is_some(),
            subscriber.is_some()
        );

        Ok(Self {
            inner: Arc::new(NodeInner {
                identity,
                codec,
                dealer,
                requests,
                responses,
                publications,
                subscriber,
                tasks: Mutex::new(tasks),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn has_request(&self) -> bool {
        self.inner.requests.is_some()
    }

    pub fn has_response(&self) -> bool {
        self.inner.responses.is_some()
    }

    pub fn has_publish(&self) -> bool {
        self.inner.publications.is_some()
    }

    pub fn has_subscribe(&self) -> bool {
        self.inner.subscriber.is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(MessagingError::Closed)
        } else {
            Ok(())
        }
    }

    fn not_configured(&self, what: &str) -> MessagingError {
        MessagingError::Configuration(format!(
            "node '{}' is not configured to {what}",
            self.inner.identity
        ))
    }

    fn requests(&self) -> Result<&RequestCapability> {
        self.ensure_open()?;
        self.inner
            .requests
            .as_ref()
            .ok_or_else(|| self.not_configured("make requests"))
    }

    fn responses(&self) -> Result<&ResponseCapability> {
        self.ensure_open()?;
        self.inner
            .responses
            .as_ref()
            .ok_or_else(|| self.not_configured("make responses"))
    }

    fn publications(&self) -> Result<&PublishCapability> {
        self.ensure_open()?;
        self.inner
            .publications
            .as_ref()
            .ok_or_else(|| self.not_configured("publish"))
    }

    fn subscriber(&self) -> Result<&Arc<Subscriber>> {
        self.ensure_open()?;
        self.inner
            .subscriber
            .as_ref()
            .ok_or_else(|| self.not_configured("subscribe"))
    }

    /// Creates request `name` addressed to node `to`.
    ///
    /// With `before`, the function's arguments go through the hook to build
    /// the payload; without it the single argument is the payload.
    pub fn create_request(&self, name: &str, to: &str, before: Option<Hook>) -> Result<RequestFunction> {
        let requests = self.requests()?;
        let mut functions = requests.functions.lock();
        if functions.contains_key(name) {
            return Err(MessagingError::DuplicateName {
                kind: "request",
                name: name.to_string(),
            });
        }

        let function = match before {
            Some(before) => requests.requester.make_for_hook(name, to, before),
            None => requests.requester.make_for_data(name, to),
        };
        functions.insert(name.to_string(), function.clone());
        debug!("{} created request '{name}' to {to}", self.inner.identity);
        Ok(function)
    }

    pub fn request(&self, name: &str) -> Option<RequestFunction> {
        let requests = self.inner.requests.as_ref()?;
        requests.functions.lock().get(name).cloned()
    }

    /// Removes request `name`; clones of it stop working too.
    pub fn remove_request(&self, name: &str) -> Result<()> {
        let requests = self.requests()?;
        let removed = requests.functions.lock().remove(name);
        match removed {
            Some(function) => {
                function.deactivate();
                Ok(())
            }
            None => Err(MessagingError::NotFound {
                kind: "request",
                name: name.to_string(),
            }),
        }
    }

    /// Answers requests named `name` with whatever `hook` returns.
    pub fn create_response(&self, name: &str, hook: Hook) -> Result<()> {
        let responses = self.responses()?;
        let mut names = responses.names.lock();
        if names.contains(name) {
            return Err(MessagingError::DuplicateName {
                kind: "response",
                name: name.to_string(),
            });
        }

        responses.responder.add_on_request_handler(name, hook);
        names.insert(name.to_string());
        debug!("{} created response '{name}'", self.inner.identity);
        Ok(())
    }

    pub fn remove_response(&self, name: &str) -> Result<()> {
        let responses = self.responses()?;
        let mut names = responses.names.lock();
        if !names.remove(name) {
            return Err(MessagingError::NotFound {
                kind: "response",
                name: name.to_string(),
            });
        }
        responses.responder.remove_on_request_handler(name);
        Ok(())
    }

    /// Creates the publish function for topic `name`.
    pub fn create_publish(
        &self,
        name: &str,
        before: Option<Hook>,
        after: Option<AfterHandler>,
    ) -> Result<PublishFunction> {
        let publications = self.publications()?;
        let mut functions = publications.functions.lock();
        if functions.contains_key(name) {
            return Err(MessagingError::DuplicateName {
                kind: "publish",
                name: name.to_string(),
            });
        }

        let function = publications.publisher.make(
            name,
            Some(self.inner.codec.clone()),
            before,
            after,
        );
        functions.insert(name.to_string(), function.clone());
        debug!("{} created publish '{name}'", self.inner.identity);
        Ok(function)
    }

    /// Returns the existing publish function for `name`, or creates it.
    ///
    /// `before` and `after` are only used when the function is created.
    pub fn get_or_create_publish(
        &self,
        name: &str,
        before: Option<Hook>,
        after: Option<AfterHandler>,
    ) -> Result<PublishFunction> {
        if let Some(existing) = self.publications()?.functions.lock().get(name) {
            return Ok(existing.clone());
        }
        match self.create_publish(name, before, after) {
            Err(MessagingError::DuplicateName { .. }) => self
                .publish(name)
                .ok_or_else(|| MessagingError::NotFound {
                    kind: "publish",
                    name: name.to_string(),
                }),
            other => other,
        }
    }

    pub fn publish(&self, name: &str) -> Option<PublishFunction> {
        let publications = self.inner.publications.as_ref()?;
        publications.functions.lock().get(name).cloned()
    }

    /// Removes publish function `name`; clones of it stop working too.
    pub fn remove_publish(&self, name: &str) -> Result<()> {
        let publications = self.publications()?;
        let removed = publications.functions.lock().remove(name);
        match removed {
            Some(function) => {
                function.deactivate();
                Ok(())
            }
            None => Err(MessagingError::NotFound {
                kind: "publish",
                name: name.to_string(),
            }),
        }
    }

    /// Removes every publish function. Returns how many there were.
    pub fn remove_all_publish(&self) -> Result<usize> {
        let publications = self.publications()?;
        Ok(drain_publications(publications))
    }

    /// Subscribes `handler` to `topic`, but only if nothing on this node is
    /// subscribed to it yet.
    ///
    /// Returns `Ok(false)` and registers nothing when the topic already has
    /// handlers; use [`Node::create_or_add_subscription`] to add to it. An
    /// owner that is already one of those handlers gets `DuplicateHandler`.
    pub fn create_subscription(
        &self,
        topic: &str,
        owner: impl Into<OwnerId>,
        handler: Handler,
    ) -> Result<bool> {
        self.subscriber()?
            .add_handler_to_new_topic(topic, owner, handler)
    }

    pub fn create_or_add_subscription(
        &self,
        topic: &str,
        owner: impl Into<OwnerId>,
        handler: Handler,
    ) -> Result<Registration> {
        self.subscriber()?.add_handler(topic, owner, handler)
    }

    /// Returns the handlers left on `topic`, or `None` if `owner` had no
    /// handler there.
    pub fn remove_subscription_by_id(&self, owner: &OwnerId, topic: &str) -> Result<Option<usize>> {
        Ok(self.subscriber()?.remove_handler_by_id(owner, topic))
    }

    pub fn remove_all_subscriptions_with_id(&self, owner: &OwnerId) -> Result<usize> {
        Ok(self.subscriber()?.remove_all_handlers_with_id(owner))
    }

    pub fn remove_all_subscriptions_with_name(&self, topic: &str) -> Result<usize> {
        Ok(self.subscriber()?.remove_all_handlers_with_name(topic))
    }

    pub fn remove_all_subscriptions(&self) -> Result<usize> {
        Ok(self.subscriber()?.remove_all_handlers())
    }

    /// Fresh owner id from this node's subscription engine.
    pub fn next_owner_id(&self) -> Result<OwnerId> {
        Ok(self.subscriber()?.generate_owner_id())
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.inner
            .subscriber
            .as_ref()
            .map(|subscriber| subscriber.topics())
            .unwrap_or_default()
    }

    /// Number of requests still waiting for a response or timeout.
    pub fn pending_requests(&self) -> usize {
        self.inner
            .requests
            .as_ref()
            .map_or(0, |requests| requests.requester.pending_count())
    }

    /// Tears down publications, then subscriptions, then the point-to-point
    /// channel. Safe to call more than once.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(publications) = &self.inner.publications {
            drain_publications(publications);
            publications.publisher.close();
        }
        if let Some(subscriber) = &self.inner.subscriber {
            subscriber.close();
        }
        if let Some(dealer) = &self.inner.dealer {
            dealer.close();
        }
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }

        info!("node {} closed", self.inner.identity);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.inner.identity)
            .field("request", &self.has_request())
            .field("respond", &self.has_response())
            .field("publish", &self.has_publish())
            .field("subscribe", &self.has_subscribe())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn drain_publications(publications: &PublishCapability) -> usize {
    let mut functions = publications.functions.lock();
    let count = functions.len();
    for (_, function) in functions.drain() {
        function.deactivate();
    }
    count
}

/// Routes everything arriving on the dealer: requests to the responder,
/// responses to the requester.
fn spawn_point_to_point_loop(
    identity: String,
    mut inbox: Inbox,
    codec: Arc<dyn Codec>,
    requester: Option<Arc<Requester>>,
    responder: Option<Arc<Responder>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frames) = inbox.recv().await {
            let Some(body) = payload(&frames) else {
                warn!("{identity} dropping frame set without payload");
                continue;
            };
            let envelope = match Envelope::decode(codec.as_ref(), body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("{identity} dropping undecodable message: {e}");
                    continue;
                }
            };

            match (envelope, &requester, &responder) {
                (Envelope::Request(request), _, Some(responder)) => {
                    if let Err(e) = responder.handle_request(request) {
                        warn!("{identity} failed to answer request: {e}");
                    }
                }
                (Envelope::Request(request), _, None) => {
                    warn!(
                        "{identity} is not configured to respond, ignoring '{}' from {}",
                        request.name, request.from
                    );
                }
                (Envelope::Response(response), Some(requester), _) => {
                    requester.handle_response(response);
                }
                (Envelope::Response(response), None, _) => {
                    warn!(
                        "{identity} is not configured to request, ignoring response #{}",
                        response.sequence
                    );
                }
            }
        }
        debug!("{identity} point-to-point loop closed");
    })
}

fn spawn_subscription_loop(
    identity: String,
    mut inbox: Inbox,
    subscriber: Arc<Subscriber>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frames) = inbox.recv().await {
            subscriber.handle_publication(&frames);
        }
        debug!("{identity} subscription loop closed");
    })
}
