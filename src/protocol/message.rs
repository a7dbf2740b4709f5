//! Multipart messages and the wire encoding used to move them.
//!
//! A [`Message`] is an ordered sequence of byte frames, mirroring the
//! multipart messages of the identity-addressed transport: the first frame
//! carries the command tag, the following frames carry its arguments and any
//! opaque payload.
//!
//! On the wire, one logical message is packed into a single blob:
//!
//! ```text
//! [u32 frame count] ([u32 frame length][frame bytes])*
//! ```
//!
//! The blob itself travels inside an outer length-delimited frame, so each
//! receive always yields exactly one logical message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::transport::PeerId;

/// An ordered sequence of byte frames forming one logical message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Bytes>,
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Creates a message from pre-built frames.
    pub fn from_frames(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Appends a binary frame.
    pub fn push(&mut self, frame: impl Into<Bytes>) {
        self.frames.push(frame.into());
    }

    /// Appends a text frame.
    pub fn push_str(&mut self, frame: &str) {
        self.frames.push(Bytes::copy_from_slice(frame.as_bytes()));
    }

    /// Builder-style variant of [`push`](Self::push).
    pub fn with(mut self, frame: impl Into<Bytes>) -> Self {
        self.push(frame);
        self
    }

    /// Builder-style variant of [`push_str`](Self::push_str).
    pub fn with_str(mut self, frame: &str) -> Self {
        self.push_str(frame);
        self
    }

    /// All frames in order.
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the message carries no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame `index` interpreted as UTF-8 text, if present and valid.
    pub fn text_frame(&self, index: usize) -> Option<&str> {
        self.frames
            .get(index)
            .and_then(|f| std::str::from_utf8(f).ok())
    }

    /// Packs the frames into a single wire blob.
    pub fn encode(&self) -> Bytes {
        let body: usize = self.frames.iter().map(|f| 4 + f.len()).sum();
        let mut buf = BytesMut::with_capacity(4 + body);
        buf.put_u32(self.frames.len() as u32);
        for frame in &self.frames {
            buf.put_u32(frame.len() as u32);
            buf.put_slice(frame);
        }
        buf.freeze()
    }

    /// Unpacks a wire blob produced by [`encode`](Self::encode).
    pub fn decode(mut blob: Bytes) -> Result<Self, ProtocolError> {
        if blob.remaining() < 4 {
            return Err(ProtocolError::Truncated);
        }
        let count = blob.get_u32() as usize;
        let mut frames = Vec::with_capacity(count.min(64));

        for _ in 0..count {
            if blob.remaining() < 4 {
                return Err(ProtocolError::Truncated);
            }
            let len = blob.get_u32() as usize;
            if blob.remaining() < len {
                return Err(ProtocolError::Truncated);
            }
            frames.push(blob.split_to(len));
        }

        Ok(Self { frames })
    }
}

impl<T: Into<Bytes>> FromIterator<T> for Message {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A routing envelope pairing one inbound message with its sender's identity.
///
/// Created per received message; replies target the [`PeerId`] rather than a
/// connection handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Stable identity token of the sending peer.
    pub origin: PeerId,
    /// The message body.
    pub message: Message,
}

impl Envelope {
    /// Pairs a message with its origin.
    pub fn new(origin: PeerId, message: Message) -> Self {
        Self { origin, message }
    }
}
