use std::time::SystemTime;

use bytes::Bytes;

use crate::protocol::HeaderSet;

/// A client request held by the broker.
///
/// Lives either in flight (assigned to a worker) or queued for a pool.
/// `failure_count` tracks reassignments after worker loss or worker-side
/// internal errors; once it reaches the configured budget the request is
/// terminally failed instead of retried.
#[derive(Clone, Debug)]
pub struct Request {
    /// Client-assigned id, unique among live requests.
    pub id: String,
    /// Routing/requirement headers.
    pub headers: HeaderSet,
    /// Opaque payload frames, forwarded verbatim to the worker.
    pub payload: Vec<Bytes>,
    /// When the broker accepted the request.
    pub submitted_at: SystemTime,
    /// Number of failed assignment attempts so far.
    pub failure_count: u32,
}

impl Request {
    /// A fresh request with a zero failure count.
    pub fn new(id: impl Into<String>, headers: HeaderSet, payload: Vec<Bytes>) -> Self {
        Self {
            id: id.into(),
            headers,
            payload,
            submitted_at: SystemTime::now(),
            failure_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_request_has_no_failures() {
        let request = Request::new("r1", HeaderSet::new(), vec![Bytes::from_static(b"job")]);
        assert_eq!(request.id, "r1");
        assert_eq!(request.failure_count, 0);
        assert_eq!(request.payload.len(), 1);
    }
}
