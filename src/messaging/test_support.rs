//! Recording sockets for driving the engines without a transport.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::codec::{Codec, JsonCodec};
use crate::messaging::message::Envelope;
use crate::transport::message::{Frames, payload};
use crate::transport::{BroadcastReceiver, BroadcastSender, PointToPoint, TransportError};

pub struct RecordingDealer {
    identity: String,
    pub sent: Mutex<Vec<Frames>>,
}

impl RecordingDealer {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Decodes the envelope of the `index`-th sent frame set.
    pub fn envelope(&self, index: usize) -> Envelope {
        let sent = self.sent.lock();
        let body = payload(&sent[index]).expect("payload frame");
        Envelope::decode(&JsonCodec, body).expect("valid envelope")
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl PointToPoint for RecordingDealer {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn send(&self, frames: Frames) -> Result<(), TransportError> {
        self.sent.lock().push(frames);
        Ok(())
    }

    fn close(&self) {}
}

#[derive(Default)]
pub struct RecordingBroadcast {
    pub sent: Mutex<Vec<Frames>>,
}

impl BroadcastSender for RecordingBroadcast {
    fn send(&self, frames: Frames) -> Result<(), TransportError> {
        self.sent.lock().push(frames);
        Ok(())
    }

    fn close(&self) {}
}

#[derive(Default)]
pub struct RecordingReceiver {
    pub filters: Mutex<HashSet<String>>,
    pub closed: AtomicBool,
}

impl RecordingReceiver {
    pub fn is_filtering(&self, topic: &str) -> bool {
        self.filters.lock().contains(topic)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl BroadcastReceiver for RecordingReceiver {
    fn subscribe(&self, topic: &str) {
        self.filters.lock().insert(topic.to_string());
    }

    fn unsubscribe(&self, topic: &str) {
        self.filters.lock().remove(topic);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn encode_json(value: &serde_json::Value) -> Vec<u8> {
    JsonCodec.encode(value).expect("encodable")
}
