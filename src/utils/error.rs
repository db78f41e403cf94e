//! The `error` module defines the error types used across `vizrelay`.
//!
//! Each component has its own narrow error enum so callers can decide which
//! failures are fatal. Nearly nothing is: dispatch errors are isolated to one
//! topic or one connection, and only a failed middleware registration at
//! startup stops the process (see [`RelayError`]).

use thiserror::Error;

/// Lookup failures in the channel catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The message type has no catalog entry. Messages of this type are dropped.
    #[error("unknown message type '{type_name}'")]
    UnknownType { type_name: String },

    /// The need kind named in a control message does not exist.
    #[error("unknown need kind '{name}'")]
    UnknownNeed { name: String },
}

/// Schema codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload does not match schema of '{type_name}': {source}")]
    Schema {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("binary codec failure for '{type_name}': {source}")]
    Binary {
        type_name: String,
        #[source]
        source: bincode::Error,
    },

    #[error("json codec failure: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures decoding a frame received from the relay.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("binary frame truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("binary frame header field of {len} bytes does not fit a u16 length")]
    HeaderTooLong { len: usize },

    #[error("binary frame header is not valid utf-8")]
    InvalidHeader(#[from] std::str::Utf8Error),

    #[error("text frame is not a recognized envelope: {0}")]
    InvalidText(#[from] serde_json::Error),

    #[error("unsupported websocket frame")]
    Unsupported,
}

/// Reference counting and middleware request failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The middleware refused or failed the subscribe request.
    #[error("subscription to '{topic}' failed: {reason}")]
    Failed { topic: String, reason: String },

    /// `release` was called more times than `acquire`. This is a bug in the caller.
    #[error("release of '{topic}' with no outstanding references")]
    ReleaseUnderflow { topic: String },
}

/// Errors reported by a middleware adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiddlewareError {
    #[error("middleware handshake has not completed")]
    NotReady,

    #[error("dynamic subscription is not registered")]
    NotRegistered,

    #[error("dynamic subscription already registered")]
    AlreadyRegistered,

    #[error("middleware request failed: {0}")]
    Request(String),
}

/// Client-side topic resolution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The topic is unknown, has no websocket channel, or its endpoint is unusable.
    #[error("no reachable endpoint for topic '{topic}'")]
    EndpointUnresolved { topic: String },

    #[error("topic '{topic}' carries '{actual}', expected '{expected}'")]
    TypeMismatch {
        topic: String,
        expected: String,
        actual: String,
    },

    #[error("no need is mounted on slot '{slot}'")]
    UnknownSlot { slot: String },

    #[error("failed to send subscription request: {0}")]
    Send(String),
}

/// Malformed control messages from a connection.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control message is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("unsubscribe needs a topic or a slot")]
    EmptyUnsubscribe,
}

/// Client session failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("relay connection closed")]
    Closed,
}

/// Top-level relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error("topic '{topic}' is not in the directory")]
    UnknownTopic { topic: String },

    #[error("topic '{topic}' carries '{actual}', need '{need}' expects '{expected}'")]
    NeedMismatch {
        topic: String,
        need: String,
        expected: String,
        actual: String,
    },

    #[error("connection '{id}' is not registered")]
    UnknownConnection { id: String },

    #[error("write to connection '{id}' failed: {reason}")]
    ConnectionWrite { id: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
