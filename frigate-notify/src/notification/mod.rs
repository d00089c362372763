//! Notification sinks.
//!
//! A sink delivers rendered text and event media to a chat. Delivery is best
//! effort: callers log failures and move on.

mod telegram;

pub use telegram::TelegramSink;

use async_trait::async_trait;

use crate::Result;
use crate::media::MediaRef;

/// Destination for notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Get the sink type name.
    fn sink_type(&self) -> &'static str;

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;

    async fn send_image(&self, chat_id: &str, image: &MediaRef) -> Result<()>;

    async fn send_video(&self, chat_id: &str, video: &MediaRef) -> Result<()>;
}
