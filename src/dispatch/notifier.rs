use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::notify::{JobOutcome, StatusNotifier};

use super::{AsyncHandler, Completion};

/// Adapts a [`StatusNotifier`] to the dispatch layer.
///
/// Non-blocking notifiers are invoked inline on the reactor thread; blocking
/// ones are wrapped in an [`AsyncHandler`] so delivery happens on the
/// blocking pool and only the result crosses back through the completion
/// queue.
#[derive(Clone)]
pub struct StatusNotifierHandler {
    notifier: Arc<dyn StatusNotifier>,
}

impl StatusNotifierHandler {
    /// Wraps a notifier.
    pub fn new(notifier: Arc<dyn StatusNotifier>) -> Self {
        Self { notifier }
    }

    /// Whether delivery must run off the reactor thread.
    pub fn is_blocking(&self) -> bool {
        self.notifier.is_blocking()
    }

    /// Notifier name, for logs.
    pub fn name(&self) -> &str {
        self.notifier.name()
    }

    /// Delivers one outcome and reports the result as a completion.
    pub fn deliver(&self, outcome: &JobOutcome) -> Completion {
        debug!(
            notifier = self.notifier.name(),
            request_id = %outcome.request_id,
            status = outcome.status.as_label(),
            "delivering outcome"
        );
        Completion::Notified {
            request_id: outcome.request_id.clone(),
            result: self.notifier.notify(outcome),
        }
    }

    /// Builds the blocking-pool wrapper for this notifier.
    pub fn into_async(self, completions: UnboundedSender<Completion>) -> AsyncHandler<JobOutcome> {
        AsyncHandler::new(completions, move |outcome: JobOutcome| {
            vec![self.deliver(&outcome)]
        })
    }
}
