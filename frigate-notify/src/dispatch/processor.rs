//! Per-event pipeline executed by a dispatch worker.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use frigate_stream::Event;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::media::{MediaFetcher, MediaKind, MediaRef};
use crate::notification::NotificationSink;
use crate::render::MessageRenderer;
use crate::rules::{Rejection, RuleEvaluator};
use crate::{Error, Result};

/// Result of one delivery step.
#[derive(Debug, Clone, PartialEq)]
pub enum SendStatus {
    Sent,
    /// Not attempted: no media, or disabled for this camera.
    Skipped,
    Failed(String),
}

impl SendStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SendStatus::Failed(_))
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendStatus::Sent => write!(f, "sent"),
            SendStatus::Skipped => write!(f, "skipped"),
            SendStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// What happened to each of the three independent sends.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub text: SendStatus,
    pub snapshot: SendStatus,
    pub clip: SendStatus,
}

impl DeliveryReport {
    pub fn failures(&self) -> u64 {
        [&self.text, &self.snapshot, &self.clip]
            .into_iter()
            .filter(|s| s.is_failed())
            .count() as u64
    }
}

/// Outcome of processing one event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Rejected(Rejection),
    Delivered(DeliveryReport),
}

/// Filters, renders and delivers single events.
pub struct EventProcessor {
    rules: RuleEvaluator,
    renderer: MessageRenderer,
    sink: Arc<dyn NotificationSink>,
    media: Arc<dyn MediaFetcher>,
    chat_id: String,
    send_timeout: Duration,
}

impl EventProcessor {
    pub fn new(
        rules: RuleEvaluator,
        renderer: MessageRenderer,
        sink: Arc<dyn NotificationSink>,
        media: Arc<dyn MediaFetcher>,
        chat_id: impl Into<String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            rules,
            renderer,
            sink,
            media,
            chat_id: chat_id.into(),
            send_timeout,
        }
    }

    pub fn from_config(
        config: &Config,
        sink: Arc<dyn NotificationSink>,
        media: Arc<dyn MediaFetcher>,
    ) -> Result<Self> {
        Ok(Self::new(
            RuleEvaluator::new(config.cameras.clone()),
            MessageRenderer::from_config(config)?,
            sink,
            media,
            config.telegram.chat_id.clone(),
            config.dispatch.send_timeout(),
        ))
    }

    /// Run the pipeline for one event. Never fails: every problem is folded
    /// into the returned outcome.
    pub async fn process(&self, event: &Event) -> ProcessOutcome {
        let rule = match self.rules.evaluate(event) {
            Ok(rule) => rule,
            Err(rejection) => {
                debug!("Skipping event {} from {}: {}", event.id(), event.camera(), rejection);
                return ProcessOutcome::Rejected(rejection);
            }
        };

        let message = self.renderer.render(event);
        let text = if message.is_empty() {
            debug!("Rendered message for event {} is empty, not sending text", event.id());
            SendStatus::Skipped
        } else {
            let text = message.text();
            self.status(
                event,
                "text",
                self.bounded("sending text", self.sink.send_text(&self.chat_id, &text))
                    .await,
            )
        };

        let snapshot = if event.has_snapshot() && rule.snapshot {
            self.send_media(event, MediaKind::Snapshot).await
        } else {
            SendStatus::Skipped
        };

        let clip = if event.has_clip() && rule.clip {
            self.send_media(event, MediaKind::Clip).await
        } else {
            SendStatus::Skipped
        };

        let report = DeliveryReport {
            text,
            snapshot,
            clip,
        };
        info!(
            "Notified event {} ({} on {}): text {}, snapshot {}, clip {}",
            event.id(),
            event.label(),
            event.camera(),
            report.text,
            report.snapshot,
            report.clip
        );
        ProcessOutcome::Delivered(report)
    }

    async fn send_media(&self, event: &Event, kind: MediaKind) -> SendStatus {
        let what = kind.to_string();

        let media = match kind {
            MediaKind::Snapshot => {
                self.bounded("fetching snapshot", self.media.snapshot_ref(event.id()))
                    .await
            }
            MediaKind::Clip => {
                self.bounded("fetching clip", self.media.clip_ref(event.id()))
                    .await
            }
        };
        let media = match media {
            Ok(media) => media,
            Err(e) => return self.status(event, &what, Err(e)),
        };

        let result = match kind {
            MediaKind::Snapshot => {
                self.bounded("sending snapshot", self.sink.send_image(&self.chat_id, &media))
                    .await
            }
            MediaKind::Clip => {
                self.bounded("sending clip", self.sink.send_video(&self.chat_id, &media))
                    .await
            }
        };
        self.release(&media).await;
        self.status(event, &what, result)
    }

    async fn release(&self, media: &MediaRef) {
        if tokio::time::timeout(self.send_timeout, self.media.release(media))
            .await
            .is_err()
        {
            warn!("Releasing {} timed out", media);
        }
    }

    /// Apply the send timeout to a collaborator call.
    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.send_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} exceeded {:?}",
                what, self.send_timeout
            ))),
        }
    }

    fn status(&self, event: &Event, what: &str, result: Result<()>) -> SendStatus {
        match result {
            Ok(()) => SendStatus::Sent,
            Err(e) => {
                warn!(
                    "Failed to deliver {} for event {} via {}: {}",
                    what,
                    event.id(),
                    self.sink.sink_type(),
                    e
                );
                SendStatus::Failed(e.to_string())
            }
        }
    }
}
