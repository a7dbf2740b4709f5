//! Wire protocol: multipart messages, header sets, and command grammar.
//!
//! This module groups the **data model** of everything that crosses the
//! identity-addressed transport:
//!
//! - [`Message`] / [`Envelope`] — multipart frames and their routing envelope
//! - [`HeaderSet`] — ordered key/value pairs with duplicates
//! - [`Command`] / [`CommandKind`] — parsed commands and their dispatch tags
//! - [`reply`] — constructors for every outbound message shape
//!
//! The reactor parses each inbound message exactly once and hands the typed
//! [`Command`] to the dispatch layer; handlers never touch raw frames except
//! through the constructors in [`reply`].

mod command;
mod headers;
mod message;

pub use command::{reply, Command, CommandKind, ReplyVerdict};
pub use headers::HeaderSet;
pub use message::{Envelope, Message};
