//! In-memory identity-addressed socket over tokio channels.
//!
//! [`ChannelSocket`] is the testing seam for everything above the transport:
//! the reactor is generic over [`IdentitySocket`], so the whole broker can be
//! driven without touching the network. [`ChannelPeer`] plays the role of a
//! connected client or worker.
//!
//! ```text
//! ChannelPeer::send ──► inbound queue ──► ChannelSocket::recv (reactor)
//! ChannelSocket::send(id) ──► per-peer queue ──► ChannelPeer::recv
//! ```
//!
//! Dropping a peer closes its route, so `send` to it reports
//! [`TransportError::Closed`]; removing the route with
//! [`ChannelSocket::disconnect`] simulates a vanished worker and yields
//! [`TransportError::UnknownPeer`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{Envelope, Message};

use super::{IdentitySocket, PeerId};

type Routes = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Message>>>>;

/// The broker-side endpoint of an in-memory transport.
pub struct ChannelSocket {
    inbound_tx: mpsc::UnboundedSender<Envelope>,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    routes: Routes,
}

impl ChannelSocket {
    /// Creates an unconnected socket.
    pub fn new() -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound,
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Connects a new peer under the given identity.
    ///
    /// The identity must be unique among live peers; reconnecting under the
    /// same token replaces the previous route, mirroring a reconnect on the
    /// real transport.
    pub fn connect(&self, identity: &str) -> ChannelPeer {
        let id = PeerId::from(identity);
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .expect("route table lock poisoned")
            .insert(id.clone(), tx);
        ChannelPeer {
            id,
            to_broker: self.inbound_tx.clone(),
            from_broker: rx,
        }
    }

    /// Drops the route to a peer, as if its connection vanished.
    pub fn disconnect(&self, id: &PeerId) {
        self.routes
            .lock()
            .expect("route table lock poisoned")
            .remove(id);
    }
}

impl Default for ChannelSocket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentitySocket for ChannelSocket {
    async fn recv(&mut self) -> Result<Envelope, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }

    fn try_recv(&mut self) -> Result<Envelope, TransportError> {
        use mpsc::error::TryRecvError;
        match self.inbound.try_recv() {
            Ok(envelope) => Ok(envelope),
            Err(TryRecvError::Empty) => Err(TransportError::WouldBlock),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send(&mut self, target: &PeerId, message: Message) -> Result<(), TransportError> {
        let routes = self.routes.lock().expect("route table lock poisoned");
        let route = routes
            .get(target)
            .ok_or_else(|| TransportError::UnknownPeer(target.clone()))?;
        route.send(message).map_err(|_| TransportError::Closed)
    }
}

/// A connected in-memory peer (client or worker).
pub struct ChannelPeer {
    id: PeerId,
    to_broker: mpsc::UnboundedSender<Envelope>,
    from_broker: mpsc::UnboundedReceiver<Message>,
}

impl ChannelPeer {
    /// The identity this peer connected under.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Sends one message to the broker.
    pub fn send(&self, message: Message) {
        let _ = self.to_broker.send(Envelope::new(self.id.clone(), message));
    }

    /// Waits for the next message from the broker; `None` once disconnected.
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_broker.recv().await
    }

    /// Pulls one pending message from the broker without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.from_broker.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_carry_the_sender_identity() {
        let mut socket = ChannelSocket::new();
        let peer = socket.connect("client-1");

        peer.send(Message::new().with_str("stats"));
        let envelope = socket.recv().await.unwrap();
        assert_eq!(envelope.origin, PeerId::from("client-1"));
        assert_eq!(envelope.message.text_frame(0), Some("stats"));
    }

    #[tokio::test]
    async fn try_recv_reports_would_block_when_idle() {
        let mut socket = ChannelSocket::new();
        let _peer = socket.connect("client-1");
        assert!(matches!(
            socket.try_recv(),
            Err(TransportError::WouldBlock)
        ));
    }

    #[tokio::test]
    async fn send_to_unknown_identity_fails() {
        let mut socket = ChannelSocket::new();
        let err = socket
            .send(&PeerId::from("ghost"), Message::new().with_str("pong"))
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn send_after_disconnect_reports_unknown_peer() {
        let mut socket = ChannelSocket::new();
        let peer = socket.connect("worker-1");
        let id = peer.id().clone();

        socket.disconnect(&id);
        let err = socket.send(&id, Message::new().with_str("pong")).unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn peer_receives_broker_messages_in_order() {
        let mut socket = ChannelSocket::new();
        let mut peer = socket.connect("worker-1");
        let id = peer.id().clone();

        socket.send(&id, Message::new().with_str("first")).unwrap();
        socket.send(&id, Message::new().with_str("second")).unwrap();

        assert_eq!(peer.recv().await.unwrap().text_frame(0), Some("first"));
        assert_eq!(peer.recv().await.unwrap().text_frame(0), Some("second"));
    }
}
