use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::error::RuntimeError;
use crate::notify::StatusNotifier;
use crate::transport::IdentitySocket;

use super::core::{OutcomeHook, Reactor};
use super::shutdown::wait_for_signal;

/// The assembled broker: a reactor plus its shutdown token.
///
/// ```no_run
/// use jobroker::{Broker, BrokerConfig, TcpRouterSocket};
///
/// # async fn example() -> Result<(), jobroker::RuntimeError> {
/// let socket = TcpRouterSocket::bind("127.0.0.1:9658").await?;
/// let broker = Broker::builder(socket)
///     .config(BrokerConfig::default())
///     .build();
/// broker.run_until_signal().await
/// # }
/// ```
pub struct Broker<S: IdentitySocket> {
    reactor: Reactor<S>,
    shutdown: CancellationToken,
}

impl<S: IdentitySocket + 'static> Broker<S> {
    /// Starts assembling a broker over a socket.
    pub fn builder(socket: S) -> BrokerBuilder<S> {
        BrokerBuilder {
            socket,
            config: BrokerConfig::default(),
            notifier: None,
            outcome_hook: None,
        }
    }

    /// Token that stops the broker when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until the shutdown token fires.
    pub async fn run(self) -> Result<(), RuntimeError> {
        self.reactor.run().await
    }

    /// Runs until SIGINT/SIGTERM or the shutdown token.
    pub async fn run_until_signal(self) -> Result<(), RuntimeError> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.cancel();
        });
        self.run().await
    }
}

/// Builder for [`Broker`].
pub struct BrokerBuilder<S: IdentitySocket> {
    socket: S,
    config: BrokerConfig,
    notifier: Option<Arc<dyn StatusNotifier>>,
    outcome_hook: Option<OutcomeHook>,
}

impl<S: IdentitySocket + 'static> BrokerBuilder<S> {
    /// Sets the configuration.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs a notifier, overriding the one the configuration names.
    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Installs a hook called on the reactor thread for outcomes surfaced by
    /// the local notifier.
    pub fn with_outcome_hook(mut self, hook: impl FnMut(&crate::notify::JobOutcome) + Send + 'static) -> Self {
        self.outcome_hook = Some(Box::new(hook));
        self
    }

    /// Assembles the broker.
    pub fn build(self) -> Broker<S> {
        let shutdown = CancellationToken::new();
        let reactor = Reactor::new(
            self.socket,
            self.config,
            self.notifier,
            self.outcome_hook,
            shutdown.clone(),
        );
        Broker { reactor, shutdown }
    }
}
