//! Request engine
//!
//! Turns a fire-and-forget exchange over the point-to-point channel into an
//! awaitable call:
//! - every request gets the next sequence number of this engine (starting at
//!   0, never reused)
//! - the response callback and a timeout task are parked in the pending table
//!   under that sequence
//! - a response and the timeout race for the entry; both check-and-remove
//!   under the table lock, so exactly one of them completes the call
//!
//! Late or unknown responses are dropped, they are the expected loser of that
//! race.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::hook::{Hook, guarded};
use super::message::{Envelope, RequestMessage, ResponseMessage, Sequence};
use crate::codec::{Codec, CodecError};
use crate::transport::PointToPoint;
use crate::transport::message::addressed;
use crate::utils::error::{MessagingError, Result};

pub type ResponseCallback = Box<dyn FnOnce(Result<Value>) + Send>;

pub struct PendingRequest {
    pub sequence: Sequence,
    name: String,
    on_response: ResponseCallback,
    timeout: JoinHandle<()>,
}

#[derive(Default)]
struct RequestTable {
    next_sequence: Sequence,
    pending: HashMap<Sequence, PendingRequest>,
}

pub struct Requester {
    channel: Arc<dyn PointToPoint>,
    codec: Arc<dyn Codec>,
    timeout: Duration,
    table: Arc<Mutex<RequestTable>>,
}

impl Requester {
    /// Applied when no timeout is configured.
    pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

    pub fn new(channel: Arc<dyn PointToPoint>, codec: Arc<dyn Codec>, timeout: Duration) -> Self {
        Self {
            channel,
            codec,
            timeout,
            table: Arc::new(Mutex::new(RequestTable::default())),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Sends `data` as request `name` to `to` and parks `on_response` until
    /// the response or the timeout arrives.
    ///
    /// Must be called from within a tokio runtime; the timeout is a spawned
    /// task.
    pub fn send_request(
        &self,
        data: Value,
        name: &str,
        to: &str,
        on_response: impl FnOnce(Result<Value>) + Send + 'static,
    ) -> Result<Sequence> {
        // Held across the send so a fast response cannot miss its entry.
        let mut table = self.table.lock();
        let sequence = table.next_sequence;

        let request = Envelope::Request(RequestMessage {
            name: name.to_string(),
            from: self.channel.identity().to_string(),
            sequence,
            data,
        });
        let encoded = request.encode(self.codec.as_ref())?;
        self.channel.send(addressed(to, encoded))?;

        let timeout = self.arm_timeout(sequence);
        table.pending.insert(
            sequence,
            PendingRequest {
                sequence,
                name: name.to_string(),
                on_response: Box::new(on_response),
                timeout,
            },
        );
        table.next_sequence += 1;

        debug!("sent request '{name}' #{sequence} to {to}");
        Ok(sequence)
    }

    /// Completes the pending call for `response.sequence`, if there still is
    /// one.
    pub fn handle_response(&self, response: ResponseMessage) {
        let entry = self.table.lock().pending.remove(&response.sequence);
        let Some(pending) = entry else {
            debug!(
                "dropping response #{} with no pending request",
                response.sequence
            );
            return;
        };

        pending.timeout.abort();
        let result = match response.error {
            Some(message) => Err(MessagingError::Remote {
                name: pending.name,
                message,
            }),
            None => Ok(response.data),
        };
        (pending.on_response)(result);
    }

    fn arm_timeout(&self, sequence: Sequence) -> JoinHandle<()> {
        let table: Weak<Mutex<RequestTable>> = Arc::downgrade(&self.table);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(table) = table.upgrade() else {
                return;
            };
            let entry = table.lock().pending.remove(&sequence);
            if let Some(pending) = entry {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(
                    "request '{}' #{sequence} timed out after {timeout_ms}ms",
                    pending.name
                );
                (pending.on_response)(Err(MessagingError::RequestTimeout {
                    name: pending.name,
                    timeout_ms,
                }));
            }
        })
    }

    /// Request function whose arguments go through `before` to produce the
    /// payload.
    pub fn make_for_hook(self: &Arc<Self>, name: &str, to: &str, before: Hook) -> RequestFunction {
        RequestFunction {
            name: name.to_string(),
            to: to.to_string(),
            before: Some(before),
            requester: self.clone(),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Request function that sends its single argument as the payload.
    pub fn make_for_data(self: &Arc<Self>, name: &str, to: &str) -> RequestFunction {
        RequestFunction {
            name: name.to_string(),
            to: to.to_string(),
            before: None,
            requester: self.clone(),
            active: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("identity", &self.channel.identity())
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// A named, bound request. Cloning is cheap; clones share the engine.
#[derive(Clone)]
pub struct RequestFunction {
    name: String,
    to: String,
    before: Option<Hook>,
    requester: Arc<Requester>,
    active: Arc<AtomicBool>,
}

impl RequestFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destination(&self) -> &str {
        &self.to
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Disables this function and every clone of it.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Sends the request and resolves with the response payload.
    ///
    /// With a hook, `args` is handed to it (use a tuple or array for several
    /// arguments); without one, `args` is the payload.
    pub async fn call(&self, args: impl Serialize) -> Result<Value> {
        if !self.is_active() {
            return Err(MessagingError::NotFound {
                kind: "request",
                name: self.name.clone(),
            });
        }
        let args = serde_json::to_value(args).map_err(|e| CodecError::Encode(e.to_string()))?;
        let data = match &self.before {
            Some(before) => guarded(|| before(args)).map_err(|message| MessagingError::Hook {
                name: self.name.clone(),
                message,
            })?,
            None => args,
        };

        let (tx, rx) = oneshot::channel();
        self.requester
            .send_request(data, &self.name, &self.to, move |result| {
                let _ = tx.send(result);
            })?;

        // The sender only disappears when the engine is dropped mid-flight.
        rx.await.map_err(|_| MessagingError::Closed)?
    }

    pub async fn call_as<T: DeserializeOwned>(&self, args: impl Serialize) -> Result<T> {
        let value = self.call(args).await?;
        serde_json::from_value(value).map_err(|e| CodecError::Decode(e.to_string()).into())
    }
}

impl std::fmt::Debug for RequestFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFunction")
            .field("name", &self.name)
            .field("to", &self.to)
            .field("hooked", &self.before.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}
