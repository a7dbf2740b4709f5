//! TCP implementation of the identity-addressed socket.
//!
//! A single listener accepts connections from clients and workers alike.
//! Each connection gets a minted identity token, stable until the connection
//! closes, and a pair of pump tasks:
//!
//! ```text
//!             ┌── read pump ──► decode ──► inbound queue ──► recv() (reactor)
//! connection ─┤
//!             └── write pump ◄─ per-peer queue ◄─ send(id) (reactor)
//! ```
//!
//! Wire format: each logical message is one length-delimited frame
//! (`LengthDelimitedCodec`) whose body is the multipart encoding of
//! [`Message`]. Undecodable frames are logged and skipped; the connection
//! stays up.
//!
//! When a connection closes, its route is removed and subsequent sends to
//! that identity fail with [`TransportError::UnknownPeer`] — delivery is
//! best-effort by design.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use crate::error::{RuntimeError, TransportError};
use crate::protocol::{Envelope, Message};

use super::{IdentitySocket, PeerId};

const INBOUND_QUEUE: usize = 1024;

type Routes = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Message>>>>;

/// Identity-addressed socket over a TCP listener.
pub struct TcpRouterSocket {
    inbound: mpsc::Receiver<Envelope>,
    routes: Routes,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TcpRouterSocket {
    /// Binds the listener and starts accepting connections.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, RuntimeError> {
        let listener = TcpListener::bind(addr).await.map_err(RuntimeError::Bind)?;
        let local_addr = listener.local_addr().map_err(RuntimeError::Bind)?;

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));

        let accept_routes = Arc::clone(&routes);
        let accept_task = tokio::spawn(async move {
            let counter = AtomicU64::new(0);
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        let serial = counter.fetch_add(1, Ordering::Relaxed);
                        let id = PeerId::from_bytes(format!("tcp-{serial:08x}").as_bytes());
                        debug!(peer = %id, %peer_addr, "accepted connection");
                        spawn_connection(
                            stream,
                            id,
                            inbound_tx.clone(),
                            Arc::clone(&accept_routes),
                        );
                    }
                    Err(error) => {
                        // Transient accept failures (fd exhaustion etc.); back off briefly.
                        warn!(%error, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(Self {
            inbound,
            routes,
            local_addr,
            accept_task,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpRouterSocket {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[async_trait]
impl IdentitySocket for TcpRouterSocket {
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

/// Spawns the read and write pumps for one accepted connection.
fn spawn_connection(
    stream: TcpStream,
    id: PeerId,
    inbound: mpsc::Sender<Envelope>,
    routes: Routes,
) {
    let (read_half, write_half) = stream.into_split();
    let (route_tx, mut route_rx) = mpsc::unbounded_channel::<Message>();

    routes
        .lock()
        .expect("route table lock poisoned")
        .insert(id.clone(), route_tx);

    // Write pump: drains the per-peer queue until the route is dropped or the
    // peer stops reading.
    let writer_id = id.clone();
    tokio::spawn(async move {
        let mut framed = FramedWrite::new(write_half, LengthDelimitedCodec::new());
        while let Some(message) = route_rx.recv().await {
            if let Err(error) = framed.send(message.encode()).await {
                debug!(peer = %writer_id, %error, "write pump stopped");
                break;
            }
        }
    });

    // Read pump: decodes logical messages and feeds the shared inbound queue;
    // removes the route once the connection is gone.
    tokio::spawn(async move {
        let mut framed = FramedRead::new(read_half, LengthDelimitedCodec::new());
        while let Some(next) = framed.next().await {
            match next {
                Ok(blob) => match Message::decode(blob.freeze()) {
                    Ok(message) => {
                        if inbound
                            .send(Envelope::new(id.clone(), message))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(peer = %id, %error, "dropping undecodable message");
                    }
                },
                Err(error) => {
                    debug!(peer = %id, %error, "read pump stopped");
                    break;
                }
            }
        }

        routes
            .lock()
            .expect("route table lock poisoned")
            .remove(&id);
        debug!(peer = %id, "connection closed");
    });
}
