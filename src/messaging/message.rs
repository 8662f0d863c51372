use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{Codec, CodecError};

pub type Sequence = u64;

/// Outbound call, correlated with its answer by `sequence`.
///
/// # Example
///
/// ```rust
/// use popmesh::messaging::RequestMessage;
/// use serde_json::json;
///
/// let msg = RequestMessage {
///     name: "sum".to_string(),
///     from: "node-a".to_string(),
///     sequence: 0,
///     data: json!(12),
/// };
/// assert_eq!(msg.sequence, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub name: String,
    pub from: String,
    pub sequence: Sequence,
    #[serde(default)]
    pub data: Value,
}

/// Answer to a `RequestMessage`. `name` and `from` are not echoed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub sequence: Sequence,
    #[serde(default)]
    pub data: Value,
    /// Set when the remote hook failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Anything that arrives on the point-to-point channel.
///
/// Requests and responses share the socket, so they are told apart by shape:
/// only requests carry `name` and `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Request(RequestMessage),
    Response(ResponseMessage),
}

impl Envelope {
    pub fn encode(&self, codec: &dyn Codec) -> Result<Vec<u8>, CodecError> {
        let value = serde_json::to_value(self).map_err(|e| CodecError::Encode(e.to_string()))?;
        codec.encode(&value)
    }

    pub fn decode(codec: &dyn Codec, bytes: &[u8]) -> Result<Self, CodecError> {
        let value = codec.decode(bytes)?;
        serde_json::from_value(value).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
