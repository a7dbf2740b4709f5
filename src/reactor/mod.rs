//! The event loop.
//!
//! ```text
//!            ┌────────────────────── reactor task ──────────────────────┐
//!   peers ──▶│ socket ─▶ parse ─▶ CommandHolder ─▶ registry / outbox    │
//!            │    ▲                                        │            │
//!            │    └──── flush ◀───────────────────────-────┘            │
//!            │                                                          │
//!            │ completion queue ◀── blocking pool (notifiers)           │
//!            └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - One task owns the socket, the registry, and all handlers; nothing else
//!   touches them.
//! - Shutdown is cooperative: the token stops intake, then outstanding
//!   notifier work drains within the grace period.
//! - The heartbeat tick is synthesized as a command, so liveness sweeps run
//!   through the same dispatch path as wire traffic.

mod builder;
mod core;
mod shutdown;

pub use builder::{Broker, BrokerBuilder};
pub use core::{OutcomeHook, Reactor};
pub use shutdown::wait_for_signal;
