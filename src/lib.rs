use crate::websocket::{Payload, SessionState};
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening a WebSocket session
///
/// No session exists when one of these is returned.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The target could not be reached (DNS, refused, reset during connect)
    #[error("failed to reach {target}: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote answered but refused or botched the upgrade
    #[error("handshake with {target} rejected: {reason}")]
    HandshakeRejected { target: String, reason: String },

    /// The configured connect timeout expired
    #[error("timed out after {elapsed:?} connecting to {target}")]
    Timeout { target: String, elapsed: Duration },
}

/// Faults on an established WebSocket session
#[derive(Error, Debug)]
pub enum TransportFault {
    /// Read, write or flush failure on the socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer dropped the connection without a Close frame
    #[error("connection closed without a close frame")]
    UnexpectedEof,

    /// The peer violated the framing rules
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The configured read timeout expired
    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    /// The operation needs an open session
    #[error("session is not open (state: {0:?})")]
    NotOpen(SessionState),
}

/// Classified failure of a single request/response exchange
#[derive(Error, Debug)]
pub enum RequestError {
    /// The response status was outside 200..=299
    #[error("HTTP error! Status: {status}")]
    HttpStatus { status: StatusCode },

    /// The exchange failed before a usable response arrived
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The response body was not valid JSON
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request body could not be serialized
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Fieldless discriminant of [`RequestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    HttpStatus,
    Transport,
    Decode,
    Encode,
}

impl RequestError {
    pub fn kind(&self) -> RequestErrorKind {
        match self {
            RequestError::HttpStatus { .. } => RequestErrorKind::HttpStatus,
            RequestError::Transport(_) => RequestErrorKind::Transport,
            RequestError::Decode(_) => RequestErrorKind::Decode,
            RequestError::Encode(_) => RequestErrorKind::Encode,
        }
    }
}

/// Error types for the echoprobe library
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration errors (bad endpoint, unsupported scheme)
    #[error("Configuration error: {0}")]
    Config(String),

    /// WebSocket session could not be opened
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// WebSocket session faulted after the handshake
    #[error(transparent)]
    Transport(#[from] TransportFault),

    /// Request/response exchange failed
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The echoed payload differs from what was sent
    #[error("echo mismatch: sent {sent}, received {received}")]
    EchoMismatch { sent: Payload, received: Payload },
}

/// Result type for the echoprobe library
pub type Result<T> = std::result::Result<T, ProbeError>;

pub mod common;
pub mod request;
pub mod network;
pub mod websocket;

// Re-export main types for convenience
pub use common::{ProbeEvent, ProbeObserver, TracingObserver};
pub use request::{RequestOutcome, RequestProbe, RequestProbeConfig};
pub use network::{Endpoint, Scheme};
pub use websocket::{ConnectionSession, StreamEchoProbe, StreamProbeConfig};
