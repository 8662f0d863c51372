//! Frame layouts used on the wire.
//!
//! - point-to-point: `[destination, "", payload]`
//! - broadcast: `[topic, payload]`

pub type Frame = Vec<u8>;
pub type Frames = Vec<Frame>;

/// Builds the frame set for an identity-addressed message.
pub fn addressed(to: &str, payload: Vec<u8>) -> Frames {
    vec![to.as_bytes().to_vec(), Vec::new(), payload]
}

/// Builds the frame set for a publication.
pub fn published(topic: &str, payload: Vec<u8>) -> Frames {
    vec![topic.as_bytes().to_vec(), payload]
}

/// The payload is always the last frame; leading frames are envelope.
pub fn payload(frames: &Frames) -> Option<&[u8]> {
    frames.last().map(Vec::as_slice).filter(|p| !p.is_empty())
}

/// Splits a publication into its topic and payload frames.
pub fn topic_and_payload(frames: &Frames) -> Option<(String, &[u8])> {
    match frames.as_slice() {
        [topic, payload, ..] => Some((String::from_utf8_lossy(topic).into_owned(), payload)),
        _ => None,
    }
}
