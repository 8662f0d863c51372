//! Publication engine
//!
//! Builds named publish functions over the broadcast socket. A publish
//! function optionally runs a hook to compute the payload, suppresses the
//! publication when that payload is `null`, encodes it, sends
//! `[name, encoded]`, and then runs the optional after handler with the
//! un-encoded value. There is no acknowledgment.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use super::hook::{AfterHandler, Hook, guarded};
use crate::codec::{Codec, CodecError, raw_frame};
use crate::transport::BroadcastSender;
use crate::transport::message::published;
use crate::utils::error::{MessagingError, Result};

pub struct Publisher {
    socket: Arc<dyn BroadcastSender>,
}

impl Publisher {
    pub fn new(socket: Arc<dyn BroadcastSender>) -> Self {
        Self { socket }
    }

    /// Composes a publish function for topic `name`.
    ///
    /// Without `encoder` the value goes out as raw text (strings unquoted).
    pub fn make(
        &self,
        name: &str,
        encoder: Option<Arc<dyn Codec>>,
        before: Option<Hook>,
        after: Option<AfterHandler>,
    ) -> PublishFunction {
        PublishFunction {
            name: name.to_string(),
            encoder,
            before,
            after,
            socket: self.socket.clone(),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn close(&self) {
        self.socket.close();
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct PublishFunction {
    name: String,
    encoder: Option<Arc<dyn Codec>>,
    before: Option<Hook>,
    after: Option<AfterHandler>,
    socket: Arc<dyn BroadcastSender>,
    active: Arc<AtomicBool>,
}

impl PublishFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Disables this function and every clone of it.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Publishes `args` (through the hook when there is one).
    ///
    /// Returns `Ok(false)` when the payload was `null` and nothing was sent.
    pub fn publish(&self, args: impl Serialize) -> Result<bool> {
        if !self.is_active() {
            return Err(MessagingError::NotFound {
                kind: "publish",
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

        if data.is_null() {
            debug!("publication on '{}' suppressed", self.name);
            return Ok(false);
        }

        let encoded = match &self.encoder {
            Some(codec) => codec.encode(&data)?,
            None => raw_frame(&data),
        };
        self.socket.send(published(&self.name, encoded))?;
        debug!("published on '{}'", self.name);

        if let Some(after) = &self.after {
            if let Err(message) = guarded(|| {
                after(&data);
                Ok(())
            }) {
                warn!("after handler for '{}' failed: {message}", self.name);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for PublishFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishFunction")
            .field("name", &self.name)
            .field("hooked", &self.before.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}
