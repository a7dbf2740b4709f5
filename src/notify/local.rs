use tokio::sync::mpsc::UnboundedSender;

use crate::dispatch::Completion;
use crate::error::NotifyError;

use super::{JobOutcome, StatusNotifier};

/// Feeds outcomes back into the reactor's completion queue.
///
/// Embedders consume them through the reactor's outcome hook, keeping the
/// whole pipeline in-process. Non-blocking.
pub struct LocalNotifier {
    tx: UnboundedSender<Completion>,
}

impl LocalNotifier {
    /// Builds a notifier posting into the given completion queue.
    pub fn new(tx: UnboundedSender<Completion>) -> Self {
        Self { tx }
    }
}

impl StatusNotifier for LocalNotifier {
    fn name(&self) -> &str {
        "local"
    }

    fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError> {
        self.tx
            .send(Completion::Outcome(outcome.clone()))
            .map_err(|_| NotifyError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn posts_outcome_into_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = LocalNotifier::new(tx);
        notifier
            .notify(&JobOutcome::done("r1", SystemTime::now()))
            .unwrap();

        match rx.try_recv().unwrap() {
            Completion::Outcome(outcome) => assert_eq!(outcome.request_id, "r1"),
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn closed_queue_reports_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let notifier = LocalNotifier::new(tx);
        let err = notifier
            .notify(&JobOutcome::done("r1", SystemTime::now()))
            .unwrap_err();
        assert!(matches!(err, NotifyError::QueueClosed));
    }
}
