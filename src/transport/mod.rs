//! Identity-addressed transport seam.
//!
//! The broker never talks to connections directly: it sees an
//! [`IdentitySocket`], a message-oriented socket where every inbound message
//! carries the sender's stable [`PeerId`] and every outbound message names a
//! target [`PeerId`]. Replies therefore address a token, not a connection
//! handle.
//!
//! ## Implementations
//! - [`TcpRouterSocket`] — the real transport. A TCP listener plus
//!   per-connection pump tasks that pack multipart messages into
//!   length-delimited wire frames and feed a single inbound queue.
//! - [`ChannelSocket`] — an in-memory implementation over tokio channels,
//!   used by the test suite and by embedders that host workers in-process.
//!
//! ## Guarantees
//! - one `recv` yields exactly one logical message
//! - identity tokens are stable for the lifetime of a peer's connection
//! - `send` is best-effort: a worker may vanish between dispatch and delivery
//!
//! The reactor is the only caller; it owns the socket exclusively.

mod channel;
mod tcp;

pub use channel::{ChannelPeer, ChannelSocket};
pub use tcp::TcpRouterSocket;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::protocol::{Envelope, Message};

/// An opaque identity token, stable for the lifetime of a peer's connection.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Arc<[u8]>);

impl PeerId {
    /// Builds an identity from raw bytes.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(bytes.as_ref()))
    }

    /// The raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::from_bytes(value.as_bytes())
    }
}

impl fmt::Display for PeerId {
    /// Renders printable tokens verbatim and everything else as hex, so
    /// identities are always loggable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if text.chars().all(|c| !c.is_control()) => f.write_str(text),
            _ => {
                for byte in self.0.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

/// A non-blocking, message-oriented socket multiplexed by the reactor.
///
/// `recv` suspends until a message arrives; `try_recv` returns
/// [`TransportError::WouldBlock`] when nothing is pending; `send` fails with
/// [`TransportError::UnknownPeer`] when the identity has no active route and
/// [`TransportError::Closed`] when the route (or the socket) is gone.
#[async_trait]
pub trait IdentitySocket: Send {
    /// Waits for the next inbound message.
    async fn recv(&mut self) -> Result<Envelope, TransportError>;

    /// Pulls one pending message without waiting.
    fn try_recv(&mut self) -> Result<Envelope, TransportError>;

    /// Sends one message to the peer with the given identity. Best-effort:
    /// delivery is not guaranteed even when this returns `Ok`.
    fn send(&mut self, target: &PeerId, message: Message) -> Result<(), TransportError>;
}
