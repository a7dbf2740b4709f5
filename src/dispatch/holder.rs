use std::collections::HashMap;

use tracing::warn;

use crate::protocol::{Command, CommandKind};

use super::{CommandContext, Handler, HandlerResult};

/// Binds command tags to handlers.
///
/// One handler may serve several tags; bindings index into a shared handler
/// list, so a stateful handler sees every command it is bound to.
#[derive(Default)]
pub struct CommandHolder {
    handlers: Vec<Box<dyn Handler>>,
    bindings: HashMap<CommandKind, usize>,
}

impl CommandHolder {
    /// An empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler and binds it to the given tags. A later binding for a
    /// tag replaces an earlier one.
    pub fn bind(&mut self, kinds: &[CommandKind], handler: Box<dyn Handler>) -> &mut Self {
        let index = self.handlers.len();
        self.handlers.push(handler);
        for kind in kinds {
            self.bindings.insert(*kind, index);
        }
        self
    }

    /// Dispatches a command to its bound handler. Unbound tags are dropped
    /// with a warning.
    pub fn dispatch(
        &mut self,
        command: &Command,
        ctx: &mut CommandContext<'_>,
    ) -> HandlerResult {
        let kind = command.kind();
        match self.bindings.get(&kind) {
            Some(&index) => self.handlers[index].handle(command, ctx),
            None => {
                warn!(command = kind.as_str(), "no handler bound, dropping");
                HandlerResult::NoReply
            }
        }
    }

    /// Whether a tag has a bound handler.
    pub fn is_bound(&self, kind: CommandKind) -> bool {
        self.bindings.contains_key(&kind)
    }
}
