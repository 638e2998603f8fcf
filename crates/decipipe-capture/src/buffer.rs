// crates/decipipe-capture/src/buffer.rs
// ============================================================================
// Module: Event Buffer
// Description: Bounded, drop-oldest, size- and time-flushed batcher (C3).
// Purpose: Decouple the hot path (`step()`) from network I/O entirely;
//          `add` is total and non-blocking, and the only way to observe a
//          flush is the explicit, blocking `force_flush`.
// Dependencies: parking_lot, tokio, decipipe-model
// ============================================================================

//! ## Overview
//! [`EventBuffer`] holds at most `max_size` events. `add` never blocks and
//! never fails: at capacity it drops the oldest event before appending the
//! new one. A flush is scheduled once the buffer reaches `batch_size`
//! after an `add`, and unconditionally every `flush_interval` via a
//! background timer task. At most one flush runs at a time; overlapping
//! triggers are coalesced into the in-flight one. `force_flush` is the
//! only method that may block the caller: it drains whatever remains,
//! regardless of `batch_size`, and cancels the periodic timer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use decipipe_model::DecisionEvent;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::observer::CaptureObserver;
use crate::observer::NoopObserver;

/// Accepts batches of decision events for delivery. Implemented by
/// [`crate::transport::Transport`]; a trait so the buffer can be tested
/// without a network.
#[async_trait::async_trait]
pub trait DecisionSink: Send + Sync + 'static {
    /// Delivers a batch. Must never panic and must swallow its own
    /// errors — the buffer treats this call as infallible.
    async fn send_decision_events(&self, batch: Vec<DecisionEvent>);
}

/// Configuration for [`EventBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct EventBufferConfig {
    /// Maximum number of buffered events before the oldest is dropped.
    pub max_size: usize,
    /// Size at which a flush is scheduled after `add`.
    pub batch_size: usize,
    /// Interval between unconditional periodic flushes.
    pub flush_interval: Duration,
}

impl Default for EventBufferConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            batch_size: 100,
            flush_interval: Duration::from_millis(5000),
        }
    }
}

struct Shared<S: DecisionSink> {
    config: EventBufferConfig,
    queue: Mutex<VecDeque<DecisionEvent>>,
    flushing: AtomicBool,
    flush_done: Notify,
    sink: S,
    observer: Arc<dyn CaptureObserver>,
}

/// A bounded, drop-oldest event buffer feeding a [`DecisionSink`].
pub struct EventBuffer<S: DecisionSink> {
    shared: Arc<Shared<S>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: DecisionSink> EventBuffer<S> {
    /// Builds a buffer and starts its periodic flush timer on the current
    /// Tokio runtime.
    pub fn new(config: EventBufferConfig, sink: S) -> Arc<Self> {
        Self::with_observer(config, sink, Arc::new(NoopObserver))
    }

    /// Builds a buffer with an explicit [`CaptureObserver`].
    pub fn with_observer(
        config: EventBufferConfig,
        sink: S,
        observer: Arc<dyn CaptureObserver>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            config,
            queue: Mutex::new(VecDeque::with_capacity(config.batch_size)),
            flushing: AtomicBool::new(false),
            flush_done: Notify::new(),
            sink,
            observer,
        });
        let timer_shared = Arc::clone(&shared);
        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timer_shared.config.flush_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                Self::flush_shared(&timer_shared).await;
            }
        });
        Arc::new(Self {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Appends an event. Non-blocking and total: if the buffer is at
    /// `max_size`, the oldest event is dropped first. Schedules a
    /// fire-and-forget flush once the buffer reaches `batch_size`.
    pub fn add(self: &Arc<Self>, event: DecisionEvent) {
        let should_flush = {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.config.max_size {
                queue.pop_front();
                self.shared.observer.on_buffer_drop();
            }
            queue.push_back(event);
            queue.len() >= self.shared.config.batch_size
        };
        if should_flush {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                Self::flush_shared(&shared).await;
            });
        }
    }

    /// Drains all remaining events and delivers them, then cancels the
    /// periodic timer. The only buffer operation that may block the
    /// caller; intended for graceful shutdown.
    pub async fn force_flush(self: &Arc<Self>) {
        Self::flush_shared(&self.shared).await;
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// Runs one flush cycle, coalescing with any flush already in
    /// progress: if this call loses the race it waits for the winner to
    /// finish and returns without sending anything itself.
    async fn flush_shared(shared: &Arc<Shared<S>>) {
        if shared
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            shared.flush_done.notified().await;
            return;
        }
        let batch: Vec<DecisionEvent> = {
            let mut queue = shared.queue.lock();
            queue.drain(..).collect()
        };
        if !batch.is_empty() {
            shared.sink.send_decision_events(batch).await;
        }
        shared.flushing.store(false, Ordering::Release);
        shared.flush_done.notify_waiters();
    }

    /// Number of events currently buffered, for tests and metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Whether the buffer currently holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: DecisionSink> Drop for EventBuffer<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use decipipe_model::EventId;
    use decipipe_model::ItemId;
    use decipipe_model::Outcome;
    use decipipe_model::RunId;
    use decipipe_model::StepId;
    use decipipe_model::Timestamp;
    use serde_json::Value;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;

    struct RecordingSink {
        received: AsyncMutex<Vec<Vec<DecisionEvent>>>,
        calls: AtomicUsize,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                received: AsyncMutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl DecisionSink for Arc<RecordingSink> {
        async fn send_decision_events(&self, batch: Vec<DecisionEvent>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.received.lock().await.push(batch);
        }
    }

    fn sample_event(tag: &str) -> DecisionEvent {
        DecisionEvent {
            event_id: EventId::new(tag),
            step_id: StepId::new("step-1"),
            run_id: RunId::new("run-1"),
            outcome: Outcome::Kept,
            item_id: ItemId::new(tag),
            input: Value::Null,
            output: None,
            reason: "kept".to_string(),
            score: None,
            metadata: None,
            timestamp: Timestamp::from_unix_millis(0),
        }
    }

    #[tokio::test]
    async fn add_schedules_flush_at_batch_size() {
        let sink = RecordingSink::new();
        let config = EventBufferConfig {
            max_size: 100,
            batch_size: 3,
            flush_interval: Duration::from_secs(3600),
        };
        let buffer = EventBuffer::new(config, Arc::clone(&sink));
        for i in 0..3 {
            buffer.add(sample_event(&i.to_string()));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn add_at_capacity_drops_oldest() {
        let sink = RecordingSink::new();
        let config = EventBufferConfig {
            max_size: 2,
            batch_size: 100,
            flush_interval: Duration::from_secs(3600),
        };
        let buffer = EventBuffer::new(config, Arc::clone(&sink));
        buffer.add(sample_event("a"));
        buffer.add(sample_event("b"));
        buffer.add(sample_event("c"));
        assert_eq!(buffer.len(), 2);
        buffer.force_flush().await;
        let received = sink.received.lock().await;
        let ids: Vec<_> = received[0].iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn force_flush_drains_below_batch_size() {
        let sink = RecordingSink::new();
        let config = EventBufferConfig {
            max_size: 100,
            batch_size: 100,
            flush_interval: Duration::from_secs(3600),
        };
        let buffer = EventBuffer::new(config, Arc::clone(&sink));
        buffer.add(sample_event("a"));
        buffer.force_flush().await;
        assert!(buffer.is_empty());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
