use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::NotifyError;

use super::{JobOutcome, StatusNotifier};

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// POSTs outcomes as JSON to an HTTP endpoint.
///
/// Delivery is attempted up to four times with a doubling delay starting at
/// one second. Because it blocks, [`StatusNotifier::is_blocking`] returns
/// true and the reactor runs it on a blocking worker thread.
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
}

/// JSON body sent to the endpoint. Timestamps are unix milliseconds.
#[derive(Serialize)]
struct OutcomeRecord<'a> {
    request_id: &'a str,
    status: &'static str,
    detail: &'a str,
    submitted_at: u64,
    finished_at: u64,
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl HttpNotifier {
    /// Builds a notifier for the given endpoint, optionally with basic-auth
    /// credentials.
    pub fn new(endpoint: impl Into<String>, credentials: Option<(String, String)>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.into(),
            credentials,
        }
    }

    fn post(&self, record: &OutcomeRecord<'_>) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(record);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .map_err(|err| NotifyError::Endpoint(err.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Status {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

impl StatusNotifier for HttpNotifier {
    fn name(&self) -> &str {
        "http"
    }

    fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError> {
        let record = OutcomeRecord {
            request_id: &outcome.request_id,
            status: outcome.status.as_label(),
            detail: &outcome.detail,
            submitted_at: unix_millis(outcome.submitted_at),
            finished_at: unix_millis(outcome.finished_at),
        };

        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.post(&record) {
                Ok(()) => {
                    debug!(
                        request_id = %outcome.request_id,
                        status = outcome.status.as_label(),
                        attempt,
                        "outcome delivered"
                    );
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        request_id = %outcome.request_id,
                        attempt,
                        error = %err,
                        "outcome delivery failed"
                    );
                    last_err = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        std::thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| NotifyError::Endpoint("unreachable".into())))
    }

    fn is_blocking(&self) -> bool {
        true
    }
}
