use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::error::NotifyError;
use crate::notify::JobOutcome;
use crate::protocol::Message;
use crate::transport::PeerId;

/// Deferred work finishing on the reactor thread.
///
/// The completion queue is the only path back into the reactor from blocking
/// workers; the reactor applies completions between socket reads, so all
/// broker state stays single-writer.
#[derive(Debug)]
pub enum Completion {
    /// Send a message to a peer.
    Send {
        /// Target peer.
        target: PeerId,
        /// Message to deliver.
        message: Message,
    },
    /// A terminal outcome surfaced for in-process consumers.
    Outcome(JobOutcome),
    /// A notifier finished delivering an outcome.
    Notified {
        /// The request whose outcome was delivered.
        request_id: String,
        /// Delivery result; failures are logged, never retried here.
        result: Result<(), NotifyError>,
    },
}

/// Runs blocking work off the reactor thread and feeds results back through
/// the completion queue.
///
/// `submit` is fire-and-forget from the reactor's point of view; the
/// in-flight counter lets shutdown wait (bounded by the grace period) for
/// outstanding work.
pub struct AsyncHandler<I> {
    task: Arc<dyn Fn(I) -> Vec<Completion> + Send + Sync>,
    completions: UnboundedSender<Completion>,
    inflight: Arc<AtomicUsize>,
}

impl<I: Send + 'static> AsyncHandler<I> {
    /// Wraps a blocking task.
    pub fn new(
        completions: UnboundedSender<Completion>,
        task: impl Fn(I) -> Vec<Completion> + Send + Sync + 'static,
    ) -> Self {
        Self {
            task: Arc::new(task),
            completions,
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedules one input on the blocking pool. Must be called within a
    /// tokio runtime.
    pub fn submit(&self, input: I) {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        let task = Arc::clone(&self.task);
        let completions = self.completions.clone();
        let inflight = Arc::clone(&self.inflight);
        tokio::task::spawn_blocking(move || {
            for completion in task(input) {
                if completions.send(completion).is_err() {
                    trace!("completion queue closed, result dropped");
                    break;
                }
            }
            inflight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Number of submitted inputs not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }
}
