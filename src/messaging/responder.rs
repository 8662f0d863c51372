//! Response engine
//!
//! Answers inbound requests by name. Every request gets a response: an empty
//! object when no hook is registered, the hook's result otherwise, or an
//! error indicator when the hook fails. The caller therefore never has to
//! wait for its timeout because of this side.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::hook::{Hook, guarded};
use super::message::{Envelope, RequestMessage, ResponseMessage};
use crate::codec::Codec;
use crate::transport::PointToPoint;
use crate::transport::message::addressed;
use crate::utils::error::Result;

pub struct Responder {
    channel: Arc<dyn PointToPoint>,
    codec: Arc<dyn Codec>,
    hooks: Mutex<HashMap<String, Hook>>,
}

impl Responder {
    pub fn new(channel: Arc<dyn PointToPoint>, codec: Arc<dyn Codec>) -> Self {
        Self {
            channel,
            codec,
            hooks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `hook` for requests named `name`, replacing any previous one.
    pub fn add_on_request_handler(&self, name: &str, hook: Hook) {
        self.hooks.lock().insert(name.to_string(), hook);
    }

    /// Returns whether a hook was registered under `name`.
    pub fn remove_on_request_handler(&self, name: &str) -> bool {
        self.hooks.lock().remove(name).is_some()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.hooks.lock().contains_key(name)
    }

    /// Computes the response for `request` without sending it.
    pub fn respond(&self, request: &RequestMessage) -> ResponseMessage {
        // Cloned out so a hook may (un)register handlers on this engine.
        let hook = self.hooks.lock().get(&request.name).cloned();

        let mut response = ResponseMessage {
            sequence: request.sequence,
            data: json!({}),
            error: None,
        };
        if let Some(hook) = hook {
            let data = request.data.clone();
            match guarded(|| hook(data)) {
                Ok(data) => response.data = data,
                Err(message) => {
                    warn!(
                        "handler for '{}' from {} failed: {message}",
                        request.name, request.from
                    );
                    response.data = Value::Null;
                    response.error = Some(message);
                }
            }
        } else {
            debug!("no handler for '{}', answering empty", request.name);
        }
        response
    }

    /// Answers `request` on the channel it came from.
    pub fn handle_request(&self, request: RequestMessage) -> Result<()> {
        let response = self.respond(&request);
        let encoded = Envelope::Response(response).encode(self.codec.as_ref())?;
        self.channel.send(addressed(&request.from, encoded))?;
        debug!("answered '{}' #{} for {}", request.name, request.sequence, request.from);
        Ok(())
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.hooks.lock().keys().cloned().collect();
        f.debug_struct("Responder")
            .field("identity", &self.channel.identity())
            .field("handlers", &names)
            .finish()
    }
}
