//! Command tags, parsed commands, and outbound message constructors.
//!
//! The first frame of every inbound message is a command tag. The broker
//! understands:
//!
//! ```text
//! worker → broker:   register | heartbeat | unregister | reply
//! client → broker:   job | stats | freeze | unfreeze
//! broker → worker:   dispatch | pong | intro
//! broker → client:   accept | reject | ack | stats
//! ```
//!
//! [`Command::parse`] turns an inbound [`Message`] into a typed [`Command`];
//! anything that does not fit the grammar is a [`ProtocolError`] and the
//! message is dropped by the reactor. The `reply` module builds the outbound
//! messages, so frame layouts live in exactly one place.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::protocol::{HeaderSet, Message};

/// Enumerated command tags the dispatch layer can bind handlers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Worker announces itself and its capabilities.
    Register,
    /// Worker liveness refresh.
    Heartbeat,
    /// Worker leaves voluntarily.
    Unregister,
    /// Worker reports the outcome of its assigned request.
    Reply,
    /// Client submits a unit of work.
    Job,
    /// Client asks for runtime statistics.
    Stats,
    /// Client stops the broker from accepting new jobs.
    Freeze,
    /// Client re-enables job admission.
    Unfreeze,
    /// Synthesized by the reactor when the heartbeat timer fires; never
    /// parsed from the wire.
    Tick,
}

impl CommandKind {
    /// Parses a wire command tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "register" => Some(CommandKind::Register),
            "heartbeat" => Some(CommandKind::Heartbeat),
            "unregister" => Some(CommandKind::Unregister),
            "reply" => Some(CommandKind::Reply),
            "job" => Some(CommandKind::Job),
            "stats" => Some(CommandKind::Stats),
            "freeze" => Some(CommandKind::Freeze),
            "unfreeze" => Some(CommandKind::Unfreeze),
            _ => None,
        }
    }

    /// The wire tag (or internal name, for [`CommandKind::Tick`]).
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Register => "register",
            CommandKind::Heartbeat => "heartbeat",
            CommandKind::Unregister => "unregister",
            CommandKind::Reply => "reply",
            CommandKind::Job => "job",
            CommandKind::Stats => "stats",
            CommandKind::Freeze => "freeze",
            CommandKind::Unfreeze => "unfreeze",
            CommandKind::Tick => "tick",
        }
    }
}

/// A worker's verdict on its assigned request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyVerdict {
    /// The request was processed successfully.
    Done,
    /// The request failed in a way that should not be retried.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The worker hit an internal fault; the request itself may still succeed
    /// elsewhere.
    InternalError {
        /// Human-readable fault description.
        reason: String,
    },
}

/// A fully parsed inbound command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `["register", pool, "k=v"...]`
    Register {
        /// The worker pool this worker serves.
        pool: String,
        /// Capability headers describing the worker.
        headers: HeaderSet,
    },
    /// `["heartbeat"]`
    Heartbeat,
    /// `["unregister"]`
    Unregister,
    /// `["reply", request_id, "OK" | "FAILED" reason | "INTERNAL_ERROR" reason]`
    Reply {
        /// The request the verdict refers to.
        request_id: String,
        /// The worker's verdict.
        verdict: ReplyVerdict,
    },
    /// `["job", request_id, "k=v"..., "", payload...]`
    Job {
        /// Client-chosen unique id of the request.
        request_id: String,
        /// Routing requirement headers.
        headers: HeaderSet,
        /// Opaque payload frames forwarded to the worker untouched.
        payload: Vec<Bytes>,
    },
    /// `["stats"]`
    Stats,
    /// `["freeze"]`
    Freeze,
    /// `["unfreeze"]`
    Unfreeze,
    /// Heartbeat-timer event synthesized by the reactor.
    Tick,
}

impl Command {
    /// The tag this command dispatches on.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Register { .. } => CommandKind::Register,
            Command::Heartbeat => CommandKind::Heartbeat,
            Command::Unregister => CommandKind::Unregister,
            Command::Reply { .. } => CommandKind::Reply,
            Command::Job { .. } => CommandKind::Job,
            Command::Stats => CommandKind::Stats,
            Command::Freeze => CommandKind::Freeze,
            Command::Unfreeze => CommandKind::Unfreeze,
            Command::Tick => CommandKind::Tick,
        }
    }

    /// Parses an inbound message into a typed command.
    pub fn parse(message: &Message) -> Result<Self, ProtocolError> {
        if message.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }

        let tag = message.text_frame(0).ok_or(ProtocolError::BadEncoding)?;
        let kind = CommandKind::parse(tag)
            .ok_or_else(|| ProtocolError::UnknownCommand(tag.to_string()))?;

        match kind {
            CommandKind::Register => parse_register(message),
            CommandKind::Heartbeat => Ok(Command::Heartbeat),
            CommandKind::Unregister => Ok(Command::Unregister),
            CommandKind::Reply => parse_reply(message),
            CommandKind::Job => parse_job(message),
            CommandKind::Stats => Ok(Command::Stats),
            CommandKind::Freeze => Ok(Command::Freeze),
            CommandKind::Unfreeze => Ok(Command::Unfreeze),
            // Not a wire tag; CommandKind::parse never returns it.
            CommandKind::Tick => Err(ProtocolError::UnknownCommand(tag.to_string())),
        }
    }
}

fn parse_register(message: &Message) -> Result<Command, ProtocolError> {
    let pool = message
        .text_frame(1)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ProtocolError::Malformed {
            command: "register",
            detail: "missing pool frame".to_string(),
        })?
        .to_string();

    let mut headers = HeaderSet::new();
    for index in 2..message.len() {
        let frame = message.text_frame(index).ok_or(ProtocolError::BadEncoding)?;
        let (key, value) = HeaderSet::parse_entry(frame)?;
        headers.insert(key, value);
    }

    Ok(Command::Register { pool, headers })
}

fn parse_reply(message: &Message) -> Result<Command, ProtocolError> {
    let request_id = message
        .text_frame(1)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProtocolError::Malformed {
            command: "reply",
            detail: "missing request id".to_string(),
        })?
        .to_string();

    let status = message.text_frame(2).ok_or_else(|| ProtocolError::Malformed {
        command: "reply",
        detail: "missing status frame".to_string(),
    })?;

    let reason = || {
        message
            .text_frame(3)
            .map(str::to_string)
            .ok_or(ProtocolError::Malformed {
                command: "reply",
                detail: format!("status '{}' requires a reason frame", status),
            })
    };

    let verdict = match status {
        "OK" => ReplyVerdict::Done,
        "FAILED" => ReplyVerdict::Failed { reason: reason()? },
        "INTERNAL_ERROR" => ReplyVerdict::InternalError { reason: reason()? },
        other => {
            return Err(ProtocolError::Malformed {
                command: "reply",
                detail: format!("unknown status '{other}'"),
            })
        }
    };

    Ok(Command::Reply { request_id, verdict })
}

fn parse_job(message: &Message) -> Result<Command, ProtocolError> {
    let request_id = message
        .text_frame(1)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProtocolError::Malformed {
            command: "job",
            detail: "missing request id".to_string(),
        })?
        .to_string();

    // Headers run until an empty delimiter frame; everything after it is payload.
    let mut headers = HeaderSet::new();
    let mut index = 2;
    let mut delimited = false;

    while index < message.len() {
        let frame = message.text_frame(index).ok_or(ProtocolError::BadEncoding)?;
        index += 1;
        if frame.is_empty() {
            delimited = true;
            break;
        }
        let (key, value) = HeaderSet::parse_entry(frame)?;
        headers.insert(key, value);
    }

    if !delimited {
        return Err(ProtocolError::Malformed {
            command: "job",
            detail: "missing header delimiter frame".to_string(),
        });
    }

    let payload = message.frames()[index..].to_vec();
    Ok(Command::Job {
        request_id,
        headers,
        payload,
    })
}

/// Constructors for outbound messages, keeping frame layouts in one place.
pub mod reply {
    use super::*;

    /// `["dispatch", request_id, "k=v"..., "", payload...]` — broker → worker.
    pub fn dispatch(request_id: &str, headers: &HeaderSet, payload: &[Bytes]) -> Message {
        let mut message = Message::new().with_str("dispatch").with_str(request_id);
        for frame in headers.to_frames() {
            message.push_str(&frame);
        }
        message.push_str("");
        for frame in payload {
            message.push(frame.clone());
        }
        message
    }

    /// `["accept", request_id]` — the job was dispatched or queued.
    pub fn accept(request_id: &str) -> Message {
        Message::new().with_str("accept").with_str(request_id)
    }

    /// `["reject", request_id, reason]` — the job was not admitted.
    pub fn reject(request_id: &str, reason: &str) -> Message {
        Message::new()
            .with_str("reject")
            .with_str(request_id)
            .with_str(reason)
    }

    /// `["ack"]` — control command acknowledged.
    pub fn ack() -> Message {
        Message::new().with_str("ack")
    }

    /// `["pong"]` — heartbeat answer for a known worker.
    pub fn pong() -> Message {
        Message::new().with_str("pong")
    }

    /// `["intro"]` — heartbeat answer for an unknown worker, asking it to
    /// register again (e.g. after a broker restart).
    pub fn intro() -> Message {
        Message::new().with_str("intro")
    }

    /// `["stats", key, value, ...]` — runtime statistics as alternating pairs.
    pub fn stats<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Message {
        let mut message = Message::new().with_str("stats");
        for (key, value) in pairs {
            message.push_str(key);
            message.push_str(&value);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_register_with_headers() {
        let msg = Message::new()
            .with_str("register")
            .with_str("cpu")
            .with_str("threads=4")
            .with_str("env=linux");

        let cmd = Command::parse(&msg).unwrap();
        match cmd {
            Command::Register { pool, headers } => {
                assert_eq!(pool, "cpu");
                assert_eq!(headers.get("threads"), Some("4"));
                assert_eq!(headers.get("env"), Some("linux"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_register_requires_pool() {
        let msg = Message::new().with_str("register");
        assert!(matches!(
            Command::parse(&msg),
            Err(ProtocolError::Malformed { command: "register", .. })
        ));
    }

    #[test]
    fn parse_job_splits_headers_and_payload() {
        let msg = Message::new()
            .with_str("job")
            .with_str("r-7")
            .with_str("tenant=acme")
            .with_str("")
            .with(Bytes::from_static(b"body"));

        match Command::parse(&msg).unwrap() {
            Command::Job {
                request_id,
                headers,
                payload,
            } => {
                assert_eq!(request_id, "r-7");
                assert_eq!(headers.get("tenant"), Some("acme"));
                assert_eq!(payload, vec![Bytes::from_static(b"body")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_job_requires_delimiter() {
        let msg = Message::new()
            .with_str("job")
            .with_str("r-7")
            .with_str("tenant=acme");
        assert!(matches!(
            Command::parse(&msg),
            Err(ProtocolError::Malformed { command: "job", .. })
        ));
    }

    #[test]
    fn parse_reply_verdicts() {
        let ok = Message::new().with_str("reply").with_str("r-1").with_str("OK");
        assert_eq!(
            Command::parse(&ok).unwrap(),
            Command::Reply {
                request_id: "r-1".into(),
                verdict: ReplyVerdict::Done
            }
        );

        let failed = Message::new()
            .with_str("reply")
            .with_str("r-1")
            .with_str("FAILED")
            .with_str("compile error");
        assert_eq!(
            Command::parse(&failed).unwrap(),
            Command::Reply {
                request_id: "r-1".into(),
                verdict: ReplyVerdict::Failed {
                    reason: "compile error".into()
                }
            }
        );

        let bare_failed = Message::new()
            .with_str("reply")
            .with_str("r-1")
            .with_str("FAILED");
        assert!(Command::parse(&bare_failed).is_err());
    }

    #[test]
    fn unknown_tag_is_a_protocol_error() {
        let msg = Message::new().with_str("warble");
        assert!(matches!(
            Command::parse(&msg),
            Err(ProtocolError::UnknownCommand(tag)) if tag == "warble"
        ));
    }

    #[test]
    fn empty_message_is_a_protocol_error() {
        assert!(matches!(
            Command::parse(&Message::new()),
            Err(ProtocolError::EmptyMessage)
        ));
    }

    #[test]
    fn dispatch_message_round_trips_through_job_grammar() {
        let headers: HeaderSet = [("tenant", "acme")].into_iter().collect();
        let payload = vec![Bytes::from_static(b"payload")];
        let msg = reply::dispatch("r-9", &headers, &payload);

        assert_eq!(msg.text_frame(0), Some("dispatch"));
        assert_eq!(msg.text_frame(1), Some("r-9"));
        assert_eq!(msg.text_frame(2), Some("tenant=acme"));
        assert_eq!(msg.text_frame(3), Some(""));
        assert_eq!(&msg.frames()[4], &Bytes::from_static(b"payload"));
    }
}
