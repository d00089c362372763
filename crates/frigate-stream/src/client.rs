//! Resilient event stream client.
//!
//! [`StreamClient::run`] keeps a connection to the event source open for as
//! long as the process lives. Every failure (connect error, read error, peer
//! close, malformed frame) is logged and absorbed; connectivity failures are
//! followed by a fixed backoff and a fresh connection attempt. Events
//! published while disconnected are not replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, trace, warn};

use crate::event::Event;
use crate::message::StreamMessage;
use crate::transport::{FrameStream, StreamTransport, WebSocketTransport};

/// Client settings.
#[derive(Debug, Clone, Copy)]
pub struct StreamClientConfig {
    /// Delay before every reconnect attempt.
    pub reconnect_backoff: Duration,
    /// Upper bound on a single connection handshake.
    pub connect_timeout: Duration,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Counters describing the client's activity.
#[derive(Debug, Default)]
pub struct StreamStats {
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    frames: AtomicU64,
    events: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStatsSnapshot {
    pub connect_attempts: u64,
    pub connections: u64,
    pub frames: u64,
    pub events: u64,
    pub ignored: u64,
    pub malformed: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Why a read loop ended.
enum ReadOutcome {
    Cancelled,
    Disconnected(String),
}

/// Long-running consumer of the event stream.
pub struct StreamClient<T> {
    endpoint: String,
    transport: T,
    config: StreamClientConfig,
    stats: Arc<StreamStats>,
    span: Span,
}

impl StreamClient<WebSocketTransport> {
    /// Client over a real WebSocket connection.
    pub fn websocket(endpoint: impl Into<String>, config: StreamClientConfig) -> Self {
        Self::new(endpoint, WebSocketTransport::new(config.connect_timeout), config)
    }
}

impl<T: StreamTransport> StreamClient<T> {
    pub fn new(endpoint: impl Into<String>, transport: T, config: StreamClientConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            config,
            stats: Arc::new(StreamStats::default()),
            span: Span::none(),
        }
    }

    /// Attach the span every log line of this client is emitted under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        self.stats.clone()
    }

    /// Consume the stream, calling `on_event` for every `"new"` event.
    ///
    /// Only returns once `cancel` fires. Connectivity failures never end the
    /// loop: the client waits `reconnect_backoff` and connects again, forever.
    pub async fn run<F>(&self, mut on_event: F, cancel: CancellationToken)
    where
        F: FnMut(Event) + Send,
    {
        self.run_loop(&mut on_event, &cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn run_loop<F>(&self, on_event: &mut F, cancel: &CancellationToken)
    where
        F: FnMut(Event) + Send,
    {
        let backoff = self.config.reconnect_backoff;
        let mut attempt: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            attempt += 1;
            self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Connecting to event stream {} (attempt {})",
                self.endpoint, attempt
            );

            let connect_result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.transport.connect(&self.endpoint) => result,
            };

            match connect_result {
                Ok(frames) => {
                    info!("Connected to event stream {}", self.endpoint);
                    self.stats.connections.fetch_add(1, Ordering::Relaxed);
                    attempt = 0;

                    match self.read_loop(frames, on_event, cancel).await {
                        ReadOutcome::Cancelled => break,
                        ReadOutcome::Disconnected(reason) => {
                            warn!(
                                "Event stream {} disconnected: {}; reconnecting in {:?}",
                                self.endpoint, reason, backoff
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to event stream {} (attempt {}): {}; retrying in {:?}",
                        self.endpoint, attempt, e, backoff
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        info!("Event stream client for {} stopped", self.endpoint);
    }

    /// Read frames until the connection breaks or the client is cancelled.
    ///
    /// The frame stream (and with it the connection) is dropped on return.
    async fn read_loop<F>(
        &self,
        mut frames: FrameStream,
        on_event: &mut F,
        cancel: &CancellationToken,
    ) -> ReadOutcome
    where
        F: FnMut(Event) + Send,
    {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return ReadOutcome::Cancelled,

                frame = frames.next() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text, on_event),
                    Some(Err(e)) => return ReadOutcome::Disconnected(e.to_string()),
                    None => return ReadOutcome::Disconnected("connection closed by peer".to_string()),
                },
            }
        }
    }

    fn handle_frame<F>(&self, text: &str, on_event: &mut F)
    where
        F: FnMut(Event) + Send,
    {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        match StreamMessage::decode(text) {
            Ok(StreamMessage::NewEvent(event)) => {
                debug!(
                    "New event {} on camera {} ({})",
                    event.id(),
                    event.camera(),
                    event.label()
                );
                self.stats.events.fetch_add(1, Ordering::Relaxed);
                on_event(event);
            }
            Ok(StreamMessage::Ignored(kind)) => {
                trace!("Ignoring {} message", kind);
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping malformed stream message: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, StreamError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Transport that records every attempt and always fails.
    #[derive(Default)]
    struct FailingTransport {
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl StreamTransport for FailingTransport {
        async fn connect(&self, _endpoint: &str) -> Result<FrameStream> {
            self.attempts.lock().push(Instant::now());
            Err(StreamError::connection("connection refused"))
        }
    }

    /// Transport that replays scripted connections, then fails forever.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Option<Vec<Result<String>>>>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Option<Vec<Result<String>>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn connect(&self, _endpoint: &str) -> Result<FrameStream> {
            match self.script.lock().pop_front() {
                Some(Some(frames)) => Ok(futures::stream::iter(frames).boxed()),
                _ => Err(StreamError::connection("scripted failure")),
            }
        }
    }

    fn new_event(id: &str) -> Result<String> {
        Ok(format!(
            r#"{{"type":"new","after":{{"id":"{id}","camera":"front","label":"person","start_time":1.0,"top_score":0.9}}}}"#
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_retry_indefinitely_with_fixed_backoff() {
        let transport = FailingTransport::default();
        let attempts = transport.attempts.clone();
        let client = StreamClient::new(
            "ws://frigate.invalid/ws",
            transport,
            StreamClientConfig {
                reconnect_backoff: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let stats = client.stats();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.run(|_| {}, cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(5 * 50 + 1)).await;
        assert!(!handle.is_finished(), "client gave up retrying");

        cancel.cancel();
        handle.await.unwrap();

        let attempts = attempts.lock();
        assert!(attempts.len() >= 50, "only {} attempts", attempts.len());
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(5));
        }
        assert_eq!(stats.snapshot().connections, 0);
        assert_eq!(stats.snapshot().connect_attempts, attempts.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_events_are_forwarded_and_bad_frames_skipped() {
        let transport = ScriptedTransport::new(vec![
            Some(vec![
                new_event("a"),
                Ok(r#"{"type":"update","after":{"id":"a"}}"#.to_string()),
                Ok("{broken".to_string()),
                new_event("b"),
            ]),
            None,
            Some(vec![new_event("c")]),
        ]);
        let client = StreamClient::new("ws://test", transport, StreamClientConfig::default());
        let stats = client.stats();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                client
                    .run(
                        move |event| {
                            let _ = tx.send(event);
                        },
                        cancel,
                    )
                    .await
            }
        });

        let mut ids = Vec::new();
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            ids.push(event.id().to_string());
        }
        assert_eq!(ids, vec!["a", "b", "c"]);

        cancel.cancel();
        handle.await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events, 3);
        assert_eq!(snapshot.ignored, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.connections, 2);
        assert!(snapshot.connect_attempts >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_triggers_reconnect() {
        let transport = ScriptedTransport::new(vec![
            Some(vec![
                new_event("a"),
                Err(StreamError::connection("reset by peer")),
                new_event("never-read"),
            ]),
            Some(vec![new_event("b")]),
        ]);
        let client = StreamClient::new("ws://test", transport, StreamClientConfig::default());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                client
                    .run(
                        move |event| {
                            let _ = tx.send(event);
                        },
                        cancel,
                    )
                    .await
            }
        });

        assert_eq!(rx.recv().await.unwrap().id(), "a");
        assert_eq!(rx.recv().await.unwrap().id(), "b");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_client_returns_immediately() {
        let client = StreamClient::new(
            "ws://test",
            FailingTransport::default(),
            StreamClientConfig::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        client.run(|_| {}, cancel).await;
        assert_eq!(client.stats().snapshot().connect_attempts, 0);
    }
}
