//! # jobroker
//!
//! A single-threaded request broker: clients submit identified jobs, workers
//! register with capability headers and heartbeats, and the broker routes,
//! dispatches, and tracks every request to exactly one terminal outcome.
//!
//! ## Architecture
//!
//! ```text
//!   clients ─┐                       ┌─▶ WorkerRegistry (pools, liveness,
//!            ├─▶ IdentitySocket ──▶ reactor                in-flight, queue)
//!   workers ─┘        ▲              │
//!                     │              ├─▶ CommandHolder ─▶ BrokerHandler
//!                     └── outbox ◀───┤
//!                                    └─▶ StatusNotifier (empty / http / local)
//! ```
//!
//! All broker state lives on one reactor task. Wire messages are multipart
//! frames over an identity-addressed socket; the first frame is a command
//! tag. Blocking work (the HTTP notifier) runs on the blocking pool and
//! returns through a completion queue, so state keeps a single writer.
//!
//! ## Quick start
//!
//! ```no_run
//! use jobroker::{Broker, BrokerConfig, HeaderMatcher, RoutingRule, RoutingTable, TcpRouterSocket};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), jobroker::RuntimeError> {
//!     let config = BrokerConfig {
//!         routing: RoutingTable::new(
//!             vec![RoutingRule::new(
//!                 "gpu",
//!                 HeaderMatcher::any_of("env", ["gpu"]),
//!                 "gpu-pool",
//!             )],
//!             Some("default".into()),
//!         ),
//!         ..BrokerConfig::default()
//!     };
//!
//!     let socket = TcpRouterSocket::bind("127.0.0.1:9658").await?;
//!     Broker::builder(socket).config(config).build().run_until_signal().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — multipart framing, command grammar, outbound constructors
//! - [`transport`] — identity-addressed sockets (TCP and in-process)
//! - [`matching`] — header matchers and the routing table
//! - [`registry`] — workers, requests, liveness, and the pending queue
//! - [`dispatch`] — the command holder, handlers, and the blocking-work seam
//! - [`notify`] — pluggable terminal-outcome delivery
//! - [`reactor`] — the event loop, builder, and shutdown

pub mod config;
pub mod dispatch;
pub mod error;
pub mod matching;
pub mod notify;
pub mod protocol;
pub mod reactor;
pub mod registry;
pub mod transport;

pub use config::{BrokerConfig, NotifierConfig, QueuePolicy};
pub use dispatch::{
    AsyncHandler, BrokerHandler, CommandContext, CommandHolder, Completion, Handler,
    HandlerResult, StatusNotifierHandler,
};
pub use error::{NotifyError, ProtocolError, RuntimeError, TransportError};
pub use matching::{HeaderCondition, HeaderMatcher, RoutingRule, RoutingTable};
pub use notify::{
    EmptyNotifier, HttpNotifier, JobOutcome, LocalNotifier, OutcomeStatus, StatusNotifier,
};
pub use protocol::{Command, CommandKind, Envelope, HeaderSet, Message, ReplyVerdict};
pub use reactor::{Broker, BrokerBuilder, OutcomeHook, Reactor};
pub use registry::{
    ExpiredWorker, RegisterOutcome, Request, Worker, WorkerRegistry, WorkerState,
};
pub use transport::{ChannelPeer, ChannelSocket, IdentitySocket, PeerId, TcpRouterSocket};
