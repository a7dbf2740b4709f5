use crate::protocol::{Command, Message};

use super::CommandContext;

/// What a handler produced for the command's origin.
#[derive(Debug)]
pub enum HandlerResult {
    /// Send this message back to the origin peer.
    Reply(Message),
    /// Nothing to send back.
    NoReply,
    /// The handler hit a condition it cannot recover from. The reactor logs
    /// it at error level and keeps serving other peers.
    Fatal(String),
}

/// A command handler.
///
/// Handlers are synchronous; they mutate broker state through the context
/// and queue any messages for peers other than the origin on the context's
/// outbox. Work that must not block the reactor goes through
/// [`super::AsyncHandler`] instead.
pub trait Handler: Send {
    /// Handler name, for logs.
    fn name(&self) -> &str;

    /// Processes one command.
    fn handle(&mut self, command: &Command, ctx: &mut CommandContext<'_>) -> HandlerResult;
}
