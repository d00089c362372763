use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frigate_stream::Event;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use super::processor::{EventProcessor, ProcessOutcome};
use super::stats::{DispatchSnapshot, DispatchStats};
use crate::config::DispatchConfig;

/// Bounded event queue drained by a fixed set of workers.
///
/// [`submit`](Self::submit) never blocks: when the queue is full the event is
/// dropped and counted. Workers pull in FIFO order; there is no ordering
/// between workers.
pub struct Dispatcher {
    workers: usize,
    capacity: usize,
    processor: Arc<EventProcessor>,
    sender: mpsc::Sender<Event>,
    receiver: Arc<Mutex<mpsc::Receiver<Event>>>,
    stats: Arc<DispatchStats>,
    started: AtomicBool,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
    span: Span,
}

impl Dispatcher {
    /// Create a stopped dispatcher. Events submitted before
    /// [`start`](Self::start) wait in the queue.
    ///
    /// `workers` and `capacity` are clamped to at least 1.
    pub fn new(workers: usize, capacity: usize, processor: EventProcessor) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            workers: workers.max(1),
            capacity,
            processor: Arc::new(processor),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            stats: Arc::new(DispatchStats::default()),
            started: AtomicBool::new(false),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
            span: Span::none(),
        }
    }

    pub fn from_config(config: &DispatchConfig, processor: EventProcessor) -> Self {
        Self::new(
            config.worker_pool_size,
            config.task_queue_buffer_size,
            processor,
        )
    }

    /// Attach the span worker logs are emitted under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Enqueue without blocking. Returns `false` when the event was dropped.
    pub fn submit(&self, event: Event) -> bool {
        self.stats.record_submitted();

        if self.cancellation_token.is_cancelled() {
            self.stats.record_dropped();
            self.span.in_scope(|| {
                warn!("Dispatcher stopped, dropping event {}", event.id());
            });
            return false;
        }

        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.stats.record_dropped();
                self.span.in_scope(|| {
                    warn!(
                        "Event queue full ({} pending), dropping event {} from {}",
                        self.capacity,
                        event.id(),
                        event.camera()
                    );
                });
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.record_dropped();
                self.span.in_scope(|| {
                    warn!("Event queue closed, dropping event {}", event.id());
                });
                false
            }
        }
    }

    /// Spawn the workers. Calling it again, or after [`stop`](Self::stop), does nothing.
    pub fn start(&self) {
        if self.cancellation_token.is_cancelled() {
            self.span.in_scope(|| warn!("Dispatcher already stopped, not starting"));
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.span.in_scope(|| {
            info!(
                "Starting dispatcher with {} workers and a queue of {}",
                self.workers, self.capacity
            );
        });

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            for i in 0..self.workers {
                let receiver = self.receiver.clone();
                let processor = self.processor.clone();
                let stats = self.stats.clone();
                let cancellation_token = self.cancellation_token.clone();

                let worker = async move {
                    debug!("Worker {} started", i);

                    loop {
                        let event = tokio::select! {
                            biased;

                            _ = cancellation_token.cancelled() => break,

                            event = async { receiver.lock().await.recv().await } => match event {
                                Some(event) => event,
                                None => break,
                            },
                        };

                        let span = info_span!("event", id = %event.id(), camera = %event.camera());
                        match processor.process(&event).instrument(span).await {
                            ProcessOutcome::Rejected(_) => stats.record_rejected(),
                            ProcessOutcome::Delivered(report) => {
                                stats.record_delivered(report.failures())
                            }
                        }
                    }

                    debug!("Worker {} shutting down", i);
                };

                join_set.spawn(worker.instrument(self.span.clone()));
            }
        }
    }

    /// Stop the workers and wait for them to exit.
    ///
    /// In-flight events finish (each send is bounded by the send timeout);
    /// events still queued are discarded. Later submissions are dropped.
    pub async fn stop(&self) {
        self.span.in_scope(|| info!("Stopping dispatcher"));
        self.cancellation_token.cancel();

        // Take the join set out of the mutex before awaiting
        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        // Wait for all workers to finish (outside the lock)
        if let Some(mut join_set) = join_set {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    self.span.in_scope(|| warn!("Dispatch worker failed: {}", e));
                }
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        drop(receiver);
        self.stats.record_discarded(discarded);

        self.span.in_scope(|| {
            info!(
                "Dispatcher stopped ({} queued events discarded)",
                discarded
            );
        });
    }

    /// Events currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.cancellation_token.is_cancelled()
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }
}
