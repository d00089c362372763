//! # Frigate Notify
//!
//! Forwards detection events from a Frigate NVR to a Telegram chat.
//!
//! ```text
//! StreamClient ──submit──▶ Dispatcher queue ──▶ workers
//!                                                 │
//!                       RuleEvaluator ◀───────────┤
//!                       MessageRenderer ◀─────────┤
//!                       NotificationSink / MediaFetcher
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod media;
pub mod notification;
pub mod render;
pub mod rules;
pub mod utils;

pub use config::Config;
pub use dispatch::{Dispatcher, EventProcessor, ProcessOutcome};
pub use error::{Error, Result};
pub use media::{FrigateMediaFetcher, MediaFetcher, MediaRef};
pub use notification::{NotificationSink, TelegramSink};
pub use render::{MessageRenderer, RenderedMessage};
pub use rules::{Rejection, RuleEvaluator};
