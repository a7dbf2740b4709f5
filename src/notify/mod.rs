//! Status notifiers.
//!
//! Every terminal request outcome is reported through a [`StatusNotifier`].
//! The notifier is a pluggable seam: the broker core produces
//! [`JobOutcome`] values and never knows where they go.
//!
//! ## Implementations
//!
//! - [`EmptyNotifier`] — discards outcomes (logs at trace level).
//! - [`HttpNotifier`] — POSTs a JSON record to a configured endpoint, with
//!   bounded retries. Declares itself blocking so the reactor runs it off
//!   the event-loop thread.
//! - [`LocalNotifier`] — feeds outcomes back into the reactor's completion
//!   queue, for embedders that consume them in-process.
//!
//! ## Rules
//!
//! - Exactly one terminal outcome per request id reaches the notifier.
//! - Notification failures are reported to the reactor (which logs them);
//!   they never fail the request itself.

mod empty;
mod http;
mod local;

pub use empty::EmptyNotifier;
pub use http::HttpNotifier;
pub use local::LocalNotifier;

use std::time::SystemTime;

use crate::error::NotifyError;

/// Terminal status of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The assigned worker reported success.
    Done,
    /// The assigned worker reported a definitive failure, or the request
    /// exhausted its reassignment budget.
    Failed,
    /// The assigned worker expired while the request was in flight and the
    /// request could not be reassigned.
    WorkerLost,
}

impl OutcomeStatus {
    /// Stable wire/log label for the status.
    pub fn as_label(&self) -> &'static str {
        match self {
            OutcomeStatus::Done => "done",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::WorkerLost => "worker-lost",
        }
    }
}

/// A terminal request outcome, as handed to a [`StatusNotifier`].
#[derive(Clone, Debug)]
pub struct JobOutcome {
    /// Client-assigned request id.
    pub request_id: String,
    /// Terminal status.
    pub status: OutcomeStatus,
    /// Human-readable detail (failure reason, empty for success).
    pub detail: String,
    /// When the broker accepted the request.
    pub submitted_at: SystemTime,
    /// When the outcome became terminal.
    pub finished_at: SystemTime,
}

impl JobOutcome {
    /// A successful outcome.
    pub fn done(request_id: impl Into<String>, submitted_at: SystemTime) -> Self {
        Self {
            request_id: request_id.into(),
            status: OutcomeStatus::Done,
            detail: String::new(),
            submitted_at,
            finished_at: SystemTime::now(),
        }
    }

    /// A failed outcome with a reason.
    pub fn failed(
        request_id: impl Into<String>,
        detail: impl Into<String>,
        submitted_at: SystemTime,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: OutcomeStatus::Failed,
            detail: detail.into(),
            submitted_at,
            finished_at: SystemTime::now(),
        }
    }

    /// An outcome for a request whose worker expired mid-flight.
    pub fn worker_lost(
        request_id: impl Into<String>,
        detail: impl Into<String>,
        submitted_at: SystemTime,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: OutcomeStatus::WorkerLost,
            detail: detail.into(),
            submitted_at,
            finished_at: SystemTime::now(),
        }
    }

    /// Whether the outcome is [`OutcomeStatus::Done`].
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Done
    }
}

/// Delivery sink for terminal request outcomes.
pub trait StatusNotifier: Send + Sync {
    /// Notifier name, for logs.
    fn name(&self) -> &str;

    /// Delivers one outcome. May block iff [`Self::is_blocking`] is true.
    fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError>;

    /// Whether [`Self::notify`] may block; blocking notifiers are run off
    /// the reactor thread.
    fn is_blocking(&self) -> bool {
        false
    }
}
