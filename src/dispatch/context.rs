use std::time::Instant;

use crate::config::BrokerConfig;
use crate::notify::JobOutcome;
use crate::protocol::Message;
use crate::registry::WorkerRegistry;
use crate::transport::PeerId;

/// Mutable view of broker state handed to a handler for one command.
///
/// The outbox collects messages for peers other than the origin (the origin's
/// reply travels back through [`super::HandlerResult::Reply`]); outcomes
/// collect terminal request results for the notifier. The reactor flushes
/// both after the handler returns.
pub struct CommandContext<'a> {
    /// Peer the command came from.
    pub origin: PeerId,
    /// Worker and request bookkeeping.
    pub registry: &'a mut WorkerRegistry,
    /// Broker configuration.
    pub config: &'a BrokerConfig,
    /// Monotonic timestamp of the reactor iteration.
    pub now: Instant,
    outbox: &'a mut Vec<(PeerId, Message)>,
    outcomes: &'a mut Vec<JobOutcome>,
}

impl<'a> CommandContext<'a> {
    /// Builds a context for one command.
    pub fn new(
        origin: PeerId,
        registry: &'a mut WorkerRegistry,
        config: &'a BrokerConfig,
        now: Instant,
        outbox: &'a mut Vec<(PeerId, Message)>,
        outcomes: &'a mut Vec<JobOutcome>,
    ) -> Self {
        Self {
            origin,
            registry,
            config,
            now,
            outbox,
            outcomes,
        }
    }

    /// Queues a message for a peer.
    pub fn send(&mut self, target: PeerId, message: Message) {
        self.outbox.push((target, message));
    }

    /// Records a terminal request outcome for the notifier.
    pub fn outcome(&mut self, outcome: JobOutcome) {
        self.outcomes.push(outcome);
    }
}
