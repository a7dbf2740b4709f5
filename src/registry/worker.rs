use std::time::Instant;

use crate::protocol::HeaderSet;
use crate::transport::PeerId;

/// Liveness/occupancy state of a registered worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Alive and available for dispatch.
    Idle,
    /// Alive with exactly one request in flight.
    Busy {
        /// Id of the in-flight request.
        request_id: String,
    },
}

impl WorkerState {
    /// Stable label for logs and stats.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Busy { .. } => "busy",
        }
    }
}

/// A registered worker.
///
/// Identity is the transport peer id; a re-registration from the same peer
/// replaces the previous record. A worker holds at most one request at a
/// time.
#[derive(Clone, Debug)]
pub struct Worker {
    /// Transport identity.
    pub id: PeerId,
    /// Pool the worker serves.
    pub pool: String,
    /// Capability headers announced at registration.
    pub headers: HeaderSet,
    /// Free-form description, for logs.
    pub description: String,
    /// Current liveness/occupancy state.
    pub state: WorkerState,
    /// Time of the most recent registration or heartbeat.
    pub last_heartbeat: Instant,
}

impl Worker {
    /// A fresh idle worker, heartbeat stamped now.
    pub fn new(
        id: PeerId,
        pool: impl Into<String>,
        headers: HeaderSet,
        description: impl Into<String>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            pool: pool.into(),
            headers,
            description: description.into(),
            state: WorkerState::Idle,
            last_heartbeat: now,
        }
    }

    /// Whether the worker is idle.
    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    /// Id of the in-flight request, if busy.
    pub fn in_flight(&self) -> Option<&str> {
        match &self.state {
            WorkerState::Busy { request_id } => Some(request_id),
            WorkerState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_is_idle() {
        let worker = Worker::new(
            PeerId::from("w1"),
            "default",
            HeaderSet::new(),
            "",
            Instant::now(),
        );
        assert!(worker.is_idle());
        assert_eq!(worker.in_flight(), None);
        assert_eq!(worker.state.as_label(), "idle");
    }

    #[test]
    fn busy_state_exposes_request_id() {
        let mut worker = Worker::new(
            PeerId::from("w1"),
            "default",
            HeaderSet::new(),
            "",
            Instant::now(),
        );
        worker.state = WorkerState::Busy {
            request_id: "r1".into(),
        };
        assert_eq!(worker.in_flight(), Some("r1"));
        assert_eq!(worker.state.as_label(), "busy");
    }
}
