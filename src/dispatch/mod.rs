//! Command dispatch.
//!
//! The reactor parses each inbound message into a [`Command`] and hands it
//! to the [`CommandHolder`], which routes it to a bound [`Handler`]. Handlers
//! run synchronously on the reactor thread and mutate broker state through a
//! [`CommandContext`]; anything that may block is pushed onto the blocking
//! pool through an [`AsyncHandler`] and comes back as a [`Completion`].
//!
//! ```text
//!   socket ──> Command ──> CommandHolder ──> Handler ──> outbox / outcomes
//!                                               │
//!                                 blocking work │ AsyncHandler
//!                                               ▼
//!                                     completion queue ──> reactor
//! ```
//!
//! ## Rules
//!
//! - Handlers never perform I/O; they queue messages on the context's outbox
//!   and the reactor flushes it.
//! - The completion queue is the single entry point back onto the reactor
//!   thread; broker state has exactly one writer.
//!
//! [`Command`]: crate::protocol::Command

mod asynchronous;
mod broker;
mod context;
mod handler;
mod holder;
mod notifier;

pub use asynchronous::{AsyncHandler, Completion};
pub use broker::BrokerHandler;
pub use context::CommandContext;
pub use handler::{Handler, HandlerResult};
pub use holder::CommandHolder;
pub use notifier::StatusNotifierHandler;
