//! The `error` module defines the error types surfaced by the messaging layer.
//!
//! Engines and the `Node` facade return `MessagingError`. Codec and transport
//! failures are wrapped so callers can match on one type.

use thiserror::Error;

use crate::codec::CodecError;
use crate::transport::TransportError;

/// Error type for user supplied hooks and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, MessagingError>;

#[derive(Debug, Error)]
pub enum MessagingError {
    /// A capability was used or configured without its prerequisites.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("owner '{owner}' already has a handler on topic '{topic}'")]
    DuplicateHandler { topic: String, owner: String },

    #[error("no {kind} named '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("Request timed out after {timeout_ms}ms")]
    RequestTimeout { name: String, timeout_ms: u64 },

    /// The remote response hook failed; the response carried its message.
    #[error("request '{name}' failed remotely: {message}")]
    Remote { name: String, message: String },

    /// A local hook failed before anything was sent.
    #[error("hook for '{name}' failed: {message}")]
    Hook { name: String, message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("node is closed")]
    Closed,
}
