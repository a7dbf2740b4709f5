//! Error types used by the broker runtime.
//!
//! The taxonomy follows the layers of the system:
//!
//! - [`TransportError`] — failures of the identity-addressed socket. These are
//!   recovered locally and never propagate past the transport wrapper except
//!   as a logged, non-fatal event.
//! - [`ProtocolError`] — malformed or unknown wire messages. The offending
//!   message is discarded and logged; the connection stays up.
//! - [`NotifyError`] — failures while reporting a job outcome to a status
//!   sink. Logged, never fatal, never retried by the reactor itself.
//! - [`RuntimeError`] — failures of the broker core. Only a catastrophic
//!   socket failure terminates the run loop, and that termination is explicit.
//!
//! Each type provides `as_label()` for stable snake_case identifiers in
//! logs/metrics.

use std::time::Duration;

use thiserror::Error;

use crate::transport::PeerId;

/// Errors produced by the identity-addressed socket.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// No message is currently pending; try again after the next readiness event.
    #[error("no message is currently available")]
    WouldBlock,

    /// The target identity has no active route (peer never connected or already left).
    #[error("no active route to peer {0}")]
    UnknownPeer(PeerId),

    /// The underlying connection or the whole socket is gone.
    #[error("transport closed")]
    Closed,

    /// An I/O failure below the framing layer.
    #[error("transport i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::WouldBlock => "transport_would_block",
            TransportError::UnknownPeer(_) => "transport_unknown_peer",
            TransportError::Closed => "transport_closed",
            TransportError::Io(_) => "transport_io",
        }
    }
}

/// Errors produced while decoding inbound wire messages.
///
/// A protocol error always refers to a single message; the reactor logs it
/// and drops the message without tearing down the connection.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message contained no frames at all.
    #[error("empty message")]
    EmptyMessage,

    /// The command tag in the first frame is not known to the broker.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A known command arrived with missing or unparsable arguments.
    #[error("malformed '{command}' command: {detail}")]
    Malformed {
        /// The command tag that failed to parse.
        command: &'static str,
        /// What exactly was wrong with it.
        detail: String,
    },

    /// The multipart envelope was cut short or its length prefixes are inconsistent.
    #[error("truncated multipart message")]
    Truncated,

    /// A frame that must carry text is not valid UTF-8.
    #[error("frame is not valid utf-8")]
    BadEncoding,
}

/// Errors produced while delivering a job outcome to a status sink.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The external endpoint could not be reached or the call failed mid-flight.
    ///
    /// The detail string is an opaque rendering of the underlying transport
    /// failure; the core never depends on the client library's error type.
    #[error("status endpoint request failed: {0}")]
    Endpoint(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("status endpoint returned http {status}")]
    Status {
        /// The HTTP status code of the response.
        status: u16,
    },

    /// The outcome record could not be serialized.
    #[error("outcome could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The reactor completion queue is gone (broker already shut down).
    #[error("reactor completion queue is closed")]
    QueueClosed,
}

impl NotifyError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NotifyError::Endpoint(_) => "notify_endpoint",
            NotifyError::Status { .. } => "notify_http_status",
            NotifyError::Serialize(_) => "notify_serialize",
            NotifyError::QueueClosed => "notify_queue_closed",
        }
    }
}

/// Errors produced by the broker core itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The broker socket could not be bound.
    #[error("failed to bind broker socket: {0}")]
    Bind(std::io::Error),

    /// The broker socket failed irrecoverably while running.
    #[error("broker socket failed: {0}")]
    Transport(#[from] TransportError),

    /// The configured status notifier could not be constructed.
    #[error("status notifier setup failed: {0}")]
    Notifier(#[from] NotifyError),

    /// Shutdown grace period elapsed with deferred work still in flight.
    #[error("shutdown grace {grace:?} exceeded; {pending} deferred completions still in flight")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Number of deferred handler invocations that did not finish in time.
        pending: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Bind(_) => "runtime_bind",
            RuntimeError::Transport(_) => "runtime_transport",
            RuntimeError::Notifier(_) => "runtime_notifier",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
