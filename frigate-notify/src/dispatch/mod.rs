//! Event dispatch.
//!
//! The stream client is the single producer into a bounded queue; a fixed
//! pool of workers pulls events off it and runs each through the
//! [`EventProcessor`]. The queue is the only state shared between the two
//! sides.

mod dispatcher;
mod processor;
mod stats;

pub use dispatcher::Dispatcher;
pub use processor::{DeliveryReport, EventProcessor, ProcessOutcome, SendStatus};
pub use stats::{DispatchSnapshot, DispatchStats};
