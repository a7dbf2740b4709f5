//! Worker registry.
//!
//! Owns all broker bookkeeping: the set of registered workers, requests in
//! flight, and the per-pool pending queue. The registry is a plain state
//! machine with no I/O; the dispatch layer drives it and turns its answers
//! into wire messages.
//!
//! ## Rules
//!
//! - A worker's identity is its transport peer id; re-registration from the
//!   same peer updates the record in place.
//! - A worker holds at most one request at a time.
//! - Dispatch within a pool is round-robin: [`WorkerRegistry::select_idle`]
//!   picks the least-recently-used idle worker and moves it to the back of
//!   the rotation.
//! - Liveness is heartbeat-driven: [`WorkerRegistry::sweep`] expires workers
//!   whose last heartbeat is older than the timeout and surfaces their
//!   orphaned requests to the caller.

mod request;
mod worker;

pub use request::Request;
pub use worker::{Worker, WorkerState};

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::protocol::HeaderSet;
use crate::transport::PeerId;

/// Result of a registration attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The peer was not previously registered.
    Registered,
    /// The peer was registered and its pool or headers changed.
    Updated,
    /// The peer re-registered identically; only the heartbeat was refreshed.
    Unchanged,
}

/// A worker removed by [`WorkerRegistry::sweep`], with the request it
/// orphaned, if any.
#[derive(Debug)]
pub struct ExpiredWorker {
    /// The expired worker record.
    pub worker: Worker,
    /// The request that was in flight on it.
    pub orphaned: Option<Request>,
}

/// A request waiting for an idle worker in its pool.
#[derive(Debug)]
struct PendingRequest {
    pool: String,
    request: Request,
}

/// Broker-side bookkeeping of workers, in-flight requests, and the pending
/// queue.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    /// Rotation order doubles as dispatch priority (front is next up).
    workers: Vec<Worker>,
    /// In-flight requests keyed by request id.
    in_flight: HashMap<String, Request>,
    /// Requests waiting for an idle worker, FIFO across pools.
    pending: VecDeque<PendingRequest>,
}

impl WorkerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or re-registers a worker.
    ///
    /// Re-registration with identical pool and headers only refreshes the
    /// heartbeat. A changed pool or header set replaces the record; if the
    /// worker was busy its request is returned as orphaned and the worker
    /// comes back idle.
    pub fn register(
        &mut self,
        id: &PeerId,
        pool: impl Into<String>,
        headers: HeaderSet,
        description: impl Into<String>,
        now: Instant,
    ) -> (RegisterOutcome, Option<Request>) {
        let pool = pool.into();
        let description = description.into();

        if let Some(index) = self.workers.iter().position(|w| &w.id == id) {
            self.workers[index].last_heartbeat = now;
            if self.workers[index].pool == pool && self.workers[index].headers == headers {
                return (RegisterOutcome::Unchanged, None);
            }
            let orphaned = self.workers[index]
                .in_flight()
                .map(str::to_owned)
                .and_then(|rid| self.in_flight.remove(&rid));
            let worker = &mut self.workers[index];
            worker.pool = pool;
            worker.headers = headers;
            worker.description = description;
            worker.state = WorkerState::Idle;
            return (RegisterOutcome::Updated, orphaned);
        }

        self.workers
            .push(Worker::new(id.clone(), pool, headers, description, now));
        (RegisterOutcome::Registered, None)
    }

    /// Refreshes a worker's heartbeat. Returns false for unknown peers.
    pub fn heartbeat(&mut self, id: &PeerId, now: Instant) -> bool {
        match self.workers.iter_mut().find(|w| &w.id == id) {
            Some(worker) => {
                worker.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    /// Removes a worker, returning its record and any orphaned request.
    pub fn unregister(&mut self, id: &PeerId) -> Option<(Worker, Option<Request>)> {
        let index = self.workers.iter().position(|w| &w.id == id)?;
        let worker = self.workers.remove(index);
        let orphaned = worker
            .in_flight()
            .and_then(|rid| self.in_flight.remove(rid));
        Some((worker, orphaned))
    }

    /// Looks up a worker by peer id.
    pub fn find(&self, id: &PeerId) -> Option<&Worker> {
        self.workers.iter().find(|w| &w.id == id)
    }

    /// Whether any worker (idle or busy) serves the pool.
    pub fn pool_exists(&self, pool: &str) -> bool {
        self.workers.iter().any(|w| w.pool == pool)
    }

    /// Picks the next idle worker in a pool and rotates it to the back, so
    /// repeated dispatch spreads across the pool.
    pub fn select_idle(&mut self, pool: &str) -> Option<PeerId> {
        let index = self
            .workers
            .iter()
            .position(|w| w.pool == pool && w.is_idle())?;
        let worker = self.workers.remove(index);
        let id = worker.id.clone();
        self.workers.push(worker);
        Some(id)
    }

    /// Marks a worker busy with the given request.
    ///
    /// The worker must exist and be idle; the request id must not already be
    /// in flight. Returns the request back on violation.
    pub fn assign(&mut self, id: &PeerId, request: Request) -> Result<(), Request> {
        if self.in_flight.contains_key(&request.id) {
            return Err(request);
        }
        match self.workers.iter_mut().find(|w| &w.id == id) {
            Some(worker) if worker.is_idle() => {
                worker.state = WorkerState::Busy {
                    request_id: request.id.clone(),
                };
                self.in_flight.insert(request.id.clone(), request);
                Ok(())
            }
            _ => Err(request),
        }
    }

    /// Completes a worker's in-flight request, returning it and marking the
    /// worker idle. `None` if the worker is unknown or idle.
    pub fn complete(&mut self, id: &PeerId) -> Option<Request> {
        let worker = self.workers.iter_mut().find(|w| &w.id == id)?;
        let request_id = worker.in_flight()?.to_owned();
        worker.state = WorkerState::Idle;
        self.in_flight.remove(&request_id)
    }

    /// The in-flight request held by a worker, if any.
    pub fn in_flight_of(&self, id: &PeerId) -> Option<&Request> {
        let rid = self.find(id)?.in_flight()?;
        self.in_flight.get(rid)
    }

    /// Queues a request for a pool, refusing when the queue is at capacity.
    pub fn enqueue(
        &mut self,
        pool: impl Into<String>,
        request: Request,
        capacity: usize,
    ) -> Result<(), Request> {
        if self.pending.len() >= capacity {
            return Err(request);
        }
        self.pending.push_back(PendingRequest {
            pool: pool.into(),
            request,
        });
        Ok(())
    }

    /// Pops the oldest pending request for a pool.
    pub fn pop_pending(&mut self, pool: &str) -> Option<Request> {
        let index = self.pending.iter().position(|p| p.pool == pool)?;
        self.pending.remove(index).map(|p| p.request)
    }

    /// Expires workers whose heartbeat is older than `timeout`, returning
    /// each with its orphaned request.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<ExpiredWorker> {
        let mut expired = Vec::new();
        let mut index = 0;
        while index < self.workers.len() {
            if now.saturating_duration_since(self.workers[index].last_heartbeat) > timeout {
                let worker = self.workers.remove(index);
                let orphaned = worker
                    .in_flight()
                    .and_then(|rid| self.in_flight.remove(rid));
                expired.push(ExpiredWorker { worker, orphaned });
            } else {
                index += 1;
            }
        }
        expired
    }

    /// All registered workers, in rotation order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of idle workers.
    pub fn idle_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_idle()).count()
    }

    /// Number of requests currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of queued requests across all pools.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
