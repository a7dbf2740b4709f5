//! Broker configuration.
//!
//! Plain data with conservative defaults; the reactor and dispatch layer
//! read it, nothing mutates it after startup.

use std::time::Duration;

use crate::matching::RoutingTable;

/// What to do with an admitted job when no idle worker is available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Queue it, up to `capacity` pending requests across all pools; reject
    /// once full.
    Queue {
        /// Maximum number of queued requests.
        capacity: usize,
    },
    /// Reject immediately.
    Reject,
}

/// Which status notifier to install.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NotifierConfig {
    /// Discard outcomes.
    #[default]
    Empty,
    /// POST outcomes to an HTTP endpoint.
    Http {
        /// Endpoint URL.
        url: String,
        /// Optional basic-auth credentials.
        credentials: Option<(String, String)>,
    },
    /// Feed outcomes back to the embedding process.
    Local,
}

/// Broker-wide tunables.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Period of the reactor's liveness tick.
    pub heartbeat_interval: Duration,
    /// A worker whose last heartbeat is older than this is expired.
    pub expiry_timeout: Duration,
    /// Reassignment budget per request; at this many failures the request is
    /// terminally failed instead of retried.
    pub max_request_failures: u32,
    /// Behavior when a job arrives and no idle worker serves its pool.
    pub queue_policy: QueuePolicy,
    /// Upper bound on completions applied per reactor iteration, so a busy
    /// completion queue cannot starve the socket.
    pub completion_drain_limit: usize,
    /// How long shutdown waits for in-flight notifier work to drain.
    pub shutdown_grace: Duration,
    /// Header-based routing rules.
    pub routing: RoutingTable,
    /// Status notifier selection.
    pub notifier: NotifierConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            expiry_timeout: Duration::from_secs(4),
            max_request_failures: 10,
            queue_policy: QueuePolicy::Queue { capacity: 1024 },
            completion_drain_limit: 64,
            shutdown_grace: Duration::from_secs(5),
            routing: RoutingTable::default(),
            notifier: NotifierConfig::Empty,
        }
    }
}

impl BrokerConfig {
    /// Queue capacity under the current policy (zero when rejecting).
    pub fn queue_capacity(&self) -> usize {
        match self.queue_policy {
            QueuePolicy::Queue { capacity } => capacity,
            QueuePolicy::Reject => 0,
        }
    }
}
