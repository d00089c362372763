//! # Frigate Stream
//!
//! Consumer for the event stream published by a Frigate NVR instance.
//!
//! - [`Event`] is the validated, immutable detection event.
//! - [`StreamMessage`] decodes one `{type, after}` frame.
//! - [`StreamClient`] keeps a connection open forever, reconnecting with a
//!   fixed backoff, and hands every `"new"` event to a callback.
//!
//! The transport sits behind [`StreamTransport`] so the reconnect loop can be
//! driven without a socket.

pub mod client;
pub mod error;
pub mod event;
pub mod message;
pub mod transport;

pub use client::{StreamClient, StreamClientConfig, StreamStats, StreamStatsSnapshot};
pub use error::{Result, StreamError};
pub use event::{Event, EventBuilder, EventRecord, SubLabelRecord};
pub use message::{MessageKind, StreamMessage};
pub use transport::{FrameStream, StreamTransport, WebSocketTransport};
