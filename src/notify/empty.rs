use tracing::trace;

use crate::error::NotifyError;

use super::{JobOutcome, StatusNotifier};

/// Discards outcomes. The default notifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyNotifier;

impl StatusNotifier for EmptyNotifier {
    fn name(&self) -> &str {
        "empty"
    }

    fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError> {
        trace!(
            request_id = %outcome.request_id,
            status = outcome.status.as_label(),
            "outcome discarded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn always_succeeds() {
        let notifier = EmptyNotifier;
        let outcome = JobOutcome::done("r1", SystemTime::now());
        assert!(notifier.notify(&outcome).is_ok());
        assert!(!notifier.is_blocking());
    }
}
