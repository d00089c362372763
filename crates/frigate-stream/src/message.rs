//! Stream message envelope.
//!
//! Every frame on the event stream is a JSON object `{"type": ..., "after": ...}`.
//! Only `"new"` messages carry an actionable event; everything else is decoded
//! far enough to read the type and then discarded.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StreamError};
use crate::event::{Event, EventRecord};

/// Kind of lifecycle message published by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A detection started.
    New,
    /// An ongoing detection changed.
    Update,
    /// A detection finished.
    End,
    /// Any type this client does not know about.
    #[serde(other)]
    Other,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::New => write!(f, "new"),
            MessageKind::Update => write!(f, "update"),
            MessageKind::End => write!(f, "end"),
            MessageKind::Other => write!(f, "other"),
        }
    }
}

/// Envelope with the event payload left undecoded.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    after: Option<Value>,
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A `"new"` message with a valid event.
    NewEvent(Event),
    /// A well-formed message of a kind that is not acted upon.
    Ignored(MessageKind),
}

impl StreamMessage {
    /// Decode a text frame.
    ///
    /// The `after` payload is only decoded for `"new"` messages, so malformed
    /// payloads on other message kinds never surface as errors.
    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;

        if envelope.kind != MessageKind::New {
            return Ok(Self::Ignored(envelope.kind));
        }

        let after = envelope
            .after
            .filter(|v| !v.is_null())
            .ok_or_else(|| StreamError::protocol("\"new\" message without an \"after\" payload"))?;

        let record: EventRecord = serde_json::from_value(after)?;
        Ok(Self::NewEvent(Event::try_from(record)?))
    }
}
