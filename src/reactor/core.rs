use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::{BrokerConfig, NotifierConfig};
use crate::dispatch::{
    AsyncHandler, BrokerHandler, CommandContext, CommandHolder, Completion, HandlerResult,
    StatusNotifierHandler,
};
use crate::error::{RuntimeError, TransportError};
use crate::notify::{EmptyNotifier, HttpNotifier, JobOutcome, LocalNotifier, StatusNotifier};
use crate::protocol::{Command, CommandKind, Envelope};
use crate::registry::WorkerRegistry;
use crate::transport::{IdentitySocket, PeerId};

/// Called on the reactor thread for every outcome surfaced by the local
/// notifier path.
pub type OutcomeHook = Box<dyn FnMut(&JobOutcome) + Send>;

/// Command tags the broker handler serves.
const BROKER_COMMANDS: [CommandKind; 9] = [
    CommandKind::Register,
    CommandKind::Heartbeat,
    CommandKind::Unregister,
    CommandKind::Reply,
    CommandKind::Job,
    CommandKind::Stats,
    CommandKind::Freeze,
    CommandKind::Unfreeze,
    CommandKind::Tick,
];

/// The broker's event loop.
///
/// Owns the socket, the registry, and the command holder; everything runs on
/// one task. Each iteration applies a bounded batch of completions, then
/// waits on shutdown, the socket, and the heartbeat tick. Blocking work
/// leaves through [`AsyncHandler`] and returns only as [`Completion`]s, so
/// no broker state is ever touched off this task.
pub struct Reactor<S: IdentitySocket> {
    socket: S,
    config: BrokerConfig,
    registry: WorkerRegistry,
    holder: CommandHolder,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: UnboundedReceiver<Completion>,
    notifier: StatusNotifierHandler,
    async_notifier: Option<AsyncHandler<JobOutcome>>,
    outcome_hook: Option<OutcomeHook>,
    shutdown: CancellationToken,
}

impl<S: IdentitySocket> Reactor<S> {
    /// Builds a reactor. A `notifier` passed explicitly wins over the one
    /// named by the configuration.
    pub fn new(
        socket: S,
        config: BrokerConfig,
        notifier: Option<Arc<dyn StatusNotifier>>,
        outcome_hook: Option<OutcomeHook>,
        shutdown: CancellationToken,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let notifier: Arc<dyn StatusNotifier> = notifier.unwrap_or_else(|| match &config.notifier {
            NotifierConfig::Empty => Arc::new(EmptyNotifier),
            NotifierConfig::Http { url, credentials } => {
                Arc::new(HttpNotifier::new(url.clone(), credentials.clone()))
            }
            NotifierConfig::Local => Arc::new(LocalNotifier::new(completions_tx.clone())),
        });
        let notifier = StatusNotifierHandler::new(notifier);
        let async_notifier = notifier
            .is_blocking()
            .then(|| notifier.clone().into_async(completions_tx.clone()));

        let mut holder = CommandHolder::new();
        holder.bind(&BROKER_COMMANDS, Box::new(BrokerHandler::new()));

        Self {
            socket,
            config,
            registry: WorkerRegistry::new(),
            holder,
            completions_tx,
            completions_rx,
            notifier,
            async_notifier,
            outcome_hook,
            shutdown,
        }
    }

    /// A sender into the reactor's completion queue.
    pub fn completion_sender(&self) -> UnboundedSender<Completion> {
        self.completions_tx.clone()
    }

    /// Runs the loop until the shutdown token fires or the socket closes,
    /// then drains outstanding notifier work within the grace period.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        let mut tick = tokio::time::interval(self.config.heartbeat_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            heartbeat = ?self.config.heartbeat_interval,
            expiry = ?self.config.expiry_timeout,
            notifier = self.notifier.name(),
            "reactor running"
        );

        loop {
            // A hot completion queue must not starve the socket, so at most
            // a bounded batch is applied per iteration.
            let mut drained = 0;
            while drained < self.config.completion_drain_limit {
                match self.completions_rx.try_recv() {
                    Ok(completion) => {
                        self.apply_completion(completion);
                        drained += 1;
                    }
                    Err(_) => break,
                }
            }

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }
                received = self.socket.recv() => match received {
                    Ok(envelope) => self.handle_envelope(envelope),
                    Err(TransportError::Closed) => {
                        return Err(RuntimeError::Transport(TransportError::Closed));
                    }
                    Err(err) => warn!(error = %err, "socket receive failed"),
                },
                _ = tick.tick() => {
                    self.process(PeerId::from("broker"), Command::Tick);
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.apply_completion(completion);
                }
            }
        }

        self.drain_with_grace().await
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        let command = match Command::parse(&envelope.message) {
            Ok(command) => command,
            Err(err) => {
                warn!(peer = %envelope.origin, error = %err, "malformed message dropped");
                return;
            }
        };
        self.process(envelope.origin, command);
    }

    fn process(&mut self, origin: PeerId, command: Command) {
        let now = Instant::now();
        // Any traffic from a registered worker counts as liveness.
        if self.registry.find(&origin).is_some() {
            self.registry.heartbeat(&origin, now);
        }

        let mut outbox = Vec::new();
        let mut outcomes = Vec::new();
        let result = {
            let mut ctx = CommandContext::new(
                origin.clone(),
                &mut self.registry,
                &self.config,
                now,
                &mut outbox,
                &mut outcomes,
            );
            self.holder.dispatch(&command, &mut ctx)
        };

        match result {
            HandlerResult::Reply(message) => outbox.push((origin, message)),
            HandlerResult::NoReply => {}
            // Logged loudly, but one bad command never stops the loop.
            HandlerResult::Fatal(reason) => {
                error!(reason = %reason, "handler reported a fatal condition");
            }
        }

        for (target, message) in outbox {
            if let Err(err) = self.socket.send(&target, message) {
                warn!(peer = %target, error = %err, "send failed");
            }
        }
        for outcome in outcomes {
            self.notify(outcome);
        }
    }

    fn notify(&mut self, outcome: JobOutcome) {
        match &self.async_notifier {
            Some(handler) => handler.submit(outcome),
            None => {
                let completion = self.notifier.deliver(&outcome);
                self.apply_completion(completion);
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Send { target, message } => {
                if let Err(err) = self.socket.send(&target, message) {
                    warn!(peer = %target, error = %err, "deferred send failed");
                }
            }
            Completion::Outcome(outcome) => match &mut self.outcome_hook {
                Some(hook) => hook(&outcome),
                None => debug!(
                    request_id = %outcome.request_id,
                    "no outcome hook installed, outcome dropped"
                ),
            },
            Completion::Notified { request_id, result } => match result {
                Ok(()) => trace!(request_id = %request_id, "outcome delivered"),
                Err(err) => {
                    error!(request_id = %request_id, error = %err, "outcome delivery failed")
                }
            },
        }
    }

    /// Waits for in-flight notifier work, bounded by the grace period, and
    /// applies everything already queued.
    async fn drain_with_grace(mut self) -> Result<(), RuntimeError> {
        let grace = self.config.shutdown_grace;
        let deadline = tokio::time::Instant::now() + grace;

        if let Some(handler) = self.async_notifier.take() {
            while handler.in_flight() > 0 {
                match tokio::time::timeout_at(deadline, self.completions_rx.recv()).await {
                    Ok(Some(completion)) => self.apply_completion(completion),
                    Ok(None) => break,
                    Err(_) => {
                        return Err(RuntimeError::GraceExceeded {
                            grace,
                            pending: handler.in_flight(),
                        });
                    }
                }
            }
        }

        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply_completion(completion);
        }
        debug!("reactor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::error::NotifyError;
    use crate::matching::RoutingTable;
    use crate::notify::OutcomeStatus;
    use crate::protocol::Message;
    use crate::transport::ChannelSocket;

    use super::*;

    fn test_config() -> BrokerConfig {
        BrokerConfig {
            routing: RoutingTable::new(Vec::new(), Some("default".into())),
            heartbeat_interval: Duration::from_millis(20),
            expiry_timeout: Duration::from_millis(80),
            shutdown_grace: Duration::from_secs(1),
            ..BrokerConfig::default()
        }
    }

    struct Capturing {
        outcomes: Mutex<Vec<JobOutcome>>,
    }

    impl StatusNotifier for Capturing {
        fn name(&self) -> &str {
            "capturing"
        }

        fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError> {
            self.outcomes.lock().unwrap().push(outcome.clone());
            Ok(())
        }
    }

    fn register_message() -> Message {
        Message::new().with_str("register").with_str("default")
    }

    fn job_message(id: &str) -> Message {
        Message::new()
            .with_str("job")
            .with_str(id)
            .with_str("")
            .with_str("payload")
    }

    #[tokio::test]
    async fn full_round_trip_produces_one_outcome() {
        let socket = ChannelSocket::new();
        let mut worker = socket.connect("w1");
        let mut client = socket.connect("c1");

        let notifier = Arc::new(Capturing {
            outcomes: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();
        let reactor = Reactor::new(
            socket,
            test_config(),
            Some(notifier.clone() as Arc<dyn StatusNotifier>),
            None,
            shutdown.clone(),
        );
        let task = tokio::spawn(reactor.run());

        worker.send(register_message());
        assert_eq!(worker.recv().await.unwrap().text_frame(0), Some("ack"));

        client.send(job_message("r1"));
        let accept = client.recv().await.unwrap();
        assert_eq!(accept.text_frame(0), Some("accept"));

        let dispatch = worker.recv().await.unwrap();
        assert_eq!(dispatch.text_frame(0), Some("dispatch"));
        assert_eq!(dispatch.text_frame(1), Some("r1"));

        worker
            .send(
                Message::new()
                    .with_str("reply")
                    .with_str("r1")
                    .with_str("OK"),
            );

        // Keep heartbeating until the outcome lands so the worker never
        // expires mid-test.
        for _ in 0..50 {
            if !notifier.outcomes.lock().unwrap().is_empty() {
                break;
            }
            worker.send(Message::new().with_str("heartbeat"));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let outcomes = notifier.outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].request_id, "r1");
        assert_eq!(outcomes[0].status, OutcomeStatus::Done);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn expired_worker_yields_worker_lost_exactly_once() {
        let socket = ChannelSocket::new();
        let mut worker = socket.connect("w1");
        let mut client = socket.connect("c1");

        let notifier = Arc::new(Capturing {
            outcomes: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();
        let config = BrokerConfig {
            max_request_failures: 1,
            ..test_config()
        };
        let reactor = Reactor::new(
            socket,
            config,
            Some(notifier.clone() as Arc<dyn StatusNotifier>),
            None,
            shutdown.clone(),
        );
        let task = tokio::spawn(reactor.run());

        worker.send(register_message());
        assert_eq!(worker.recv().await.unwrap().text_frame(0), Some("ack"));
        client.send(job_message("r1"));
        assert_eq!(client.recv().await.unwrap().text_frame(0), Some("accept"));
        worker.recv().await.unwrap();

        // The worker goes silent; the tick sweep must expire it.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let outcomes = notifier.outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::WorkerLost);
        assert_eq!(outcomes[0].request_id, "r1");

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_without_stopping_the_loop() {
        let socket = ChannelSocket::new();
        let mut peer = socket.connect("p1");

        let shutdown = CancellationToken::new();
        let reactor = Reactor::new(socket, test_config(), None, None, shutdown.clone());
        let task = tokio::spawn(reactor.run());

        peer.send(Message::new().with_str("warble"));
        peer.send(Message::new());
        peer.send(Message::new().with_str("stats"));

        let stats = peer.recv().await.unwrap();
        assert_eq!(stats.text_frame(0), Some("stats"));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn local_notifier_feeds_the_outcome_hook() {
        let socket = ChannelSocket::new();
        let mut worker = socket.connect("w1");
        let mut client = socket.connect("c1");

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let config = BrokerConfig {
            notifier: NotifierConfig::Local,
            ..test_config()
        };
        let hook: OutcomeHook = Box::new(move |outcome: &JobOutcome| {
            let _ = seen_tx.send(outcome.clone());
        });
        let reactor = Reactor::new(socket, config, None, Some(hook), shutdown.clone());
        let task = tokio::spawn(reactor.run());

        worker.send(register_message());
        worker.recv().await.unwrap();
        client.send(job_message("r1"));
        client.recv().await.unwrap();
        worker.recv().await.unwrap();
        worker
            .send(
                Message::new()
                    .with_str("reply")
                    .with_str("r1")
                    .with_str("FAILED")
                    .with_str("bad input"),
            );

        let outcome = seen_rx.recv().await.unwrap();
        assert_eq!(outcome.request_id, "r1");
        assert_eq!(outcome.status, OutcomeStatus::Failed);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn deferred_sends_reach_the_peer() {
        let socket = ChannelSocket::new();
        let mut worker = socket.connect("w1");

        let shutdown = CancellationToken::new();
        let reactor = Reactor::new(socket, test_config(), None, None, shutdown.clone());
        let completions = reactor.completion_sender();
        let task = tokio::spawn(reactor.run());

        // A blocking task may answer a peer directly once its work is done;
        // the reply rides the completion queue back onto the reactor.
        let handler = AsyncHandler::new(completions, |(target, message): (PeerId, Message)| {
            vec![Completion::Send { target, message }]
        });
        handler.submit((PeerId::from("w1"), Message::new().with_str("intro")));

        let message = tokio::time::timeout(Duration::from_secs(2), worker.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.text_frame(0), Some("intro"));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
