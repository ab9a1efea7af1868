//! Ordered hand-off from channels to the durability sink.
//!
//! One bounded FIFO is shared by every channel and drained by a single
//! [`SinkWorker`]. Publishers reserve a slot before taking their channel lock
//! and submit while holding it, so queue order matches marker order within a
//! channel.

use crate::sink::{DurabilitySink, SinkError, SinkEvent};
use backon::{ExponentialBuilder, Retryable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default number of queued sink events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// What a full queue does with a new event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Publishers wait for a free slot.
    #[default]
    Block,
    /// The oldest queued event is discarded to make room.
    DropOldest,
}

/// A slot granted by [`SinkQueue::reserve`].
#[must_use = "a reservation holds a queue slot until submitted or dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    permit: Option<SemaphorePermit<'a>>,
}

/// Bounded, single-consumer FIFO of sink events.
#[derive(Debug)]
pub struct SinkQueue {
    events: Mutex<VecDeque<SinkEvent>>,
    slots: Semaphore,
    ready: Notify,
    policy: OverflowPolicy,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SinkQueue {
    /// Create a queue holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            slots: Semaphore::new(capacity),
            ready: Notify::new(),
            policy,
            capacity,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Reserve room for one event.
    ///
    /// Under [`OverflowPolicy::Block`] this waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] once the queue is closed.
    pub async fn reserve(&self) -> Result<Reservation<'_>, SinkError> {
        if self.is_closed() {
            return Err(SinkError::Unavailable("sink queue closed".into()));
        }
        match self.policy {
            OverflowPolicy::Block => self
                .slots
                .acquire()
                .await
                .map(|permit| Reservation {
                    permit: Some(permit),
                })
                .map_err(|_| SinkError::Unavailable("sink queue closed".into())),
            OverflowPolicy::DropOldest => Ok(Reservation { permit: None }),
        }
    }

    /// Enqueue `event` into a reserved slot. Never waits.
    pub fn submit(&self, reservation: Reservation<'_>, event: SinkEvent) {
        if let Some(permit) = reservation.permit {
            // The slot is handed back by the consumer once the event is popped.
            permit.forget();
        }

        let mut events = self.events.lock();
        if self.policy == OverflowPolicy::DropOldest && events.len() >= self.capacity {
            if let Some(old) = events.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = old.kind(), channel = ?old.channel(), "Sink queue full, dropped oldest event");
            }
        }
        events.push_back(event);
        drop(events);

        self.ready.notify_one();
    }

    /// Pop the next event, waiting if none is queued.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<SinkEvent> {
        loop {
            let event = self.events.lock().pop_front();
            if let Some(event) = event {
                if self.policy == OverflowPolicy::Block {
                    self.slots.add_permits(1);
                }
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            self.ready.notified().await;
        }
    }

    /// Stop accepting reservations. Queued events are still delivered.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
        self.ready.notify_one();
    }

    /// Check if the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The configured overflow policy.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Events discarded by [`OverflowPolicy::DropOldest`].
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Outcome of reserving a durability slot.
#[derive(Debug)]
pub enum Handoff<'a> {
    /// Persistence is turned off.
    Disabled,
    /// A slot is held.
    Ready(Reservation<'a>),
    /// The queue refused the reservation.
    Unavailable,
}

/// The durability handle held by every channel.
#[derive(Debug, Clone, Default)]
pub struct Durability {
    queue: Option<Arc<SinkQueue>>,
}

impl Durability {
    /// Durability backed by `queue`.
    #[must_use]
    pub fn new(queue: Arc<SinkQueue>) -> Self {
        Self { queue: Some(queue) }
    }

    /// No persistence; every event is discarded.
    #[must_use]
    pub fn disabled() -> Self {
        Self { queue: None }
    }

    /// Check if events reach a queue.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// The underlying queue, if any.
    #[must_use]
    pub fn queue(&self) -> Option<&Arc<SinkQueue>> {
        self.queue.as_ref()
    }

    /// Reserve a slot. Call this before taking a channel lock.
    pub async fn reserve(&self) -> Handoff<'_> {
        let Some(queue) = &self.queue else {
            return Handoff::Disabled;
        };
        match queue.reserve().await {
            Ok(reservation) => Handoff::Ready(reservation),
            Err(e) => {
                warn!(error = %e, "Durability hand-off unavailable");
                Handoff::Unavailable
            }
        }
    }

    /// Submit the event built by `event` into a reserved slot.
    ///
    /// Returns `false` if the event was discarded.
    pub fn submit(&self, handoff: Handoff<'_>, event: impl FnOnce() -> SinkEvent) -> bool {
        match (handoff, &self.queue) {
            (Handoff::Ready(reservation), Some(queue)) => {
                queue.submit(reservation, event());
                true
            }
            (Handoff::Unavailable, _) => {
                let event = event();
                warn!(kind = event.kind(), channel = ?event.channel(), "Dropping durability event");
                false
            }
            _ => false,
        }
    }
}

/// Retry schedule for failed sink applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First retry delay.
    pub min_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Retries before the event is given up on.
    pub max_times: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            max_times: 8,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter following this policy.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_times)
            .with_jitter()
    }
}

/// Totals reported by a finished [`SinkWorker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Events applied successfully.
    pub applied: u64,
    /// Events given up on after retries.
    pub failed: u64,
}

/// Drains a [`SinkQueue`] into a [`DurabilitySink`], in order.
pub struct SinkWorker {
    queue: Arc<SinkQueue>,
    sink: Arc<dyn DurabilitySink>,
    retry: RetryPolicy,
    failures: Arc<AtomicU64>,
}

impl SinkWorker {
    /// Create a worker with the default retry policy.
    #[must_use]
    pub fn new(queue: Arc<SinkQueue>, sink: Arc<dyn DurabilitySink>) -> Self {
        Self {
            queue,
            sink,
            retry: RetryPolicy::default(),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Use a custom retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shared counter of events given up on, readable while the worker runs.
    #[must_use]
    pub fn failures(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.failures)
    }

    /// Spawn the worker onto the current runtime.
    pub fn spawn(self) -> JoinHandle<SinkStats> {
        tokio::spawn(self.run())
    }

    /// Apply events until the queue is closed and drained.
    pub async fn run(self) -> SinkStats {
        info!(sink = self.sink.name(), "Durability worker started");
        let mut stats = SinkStats::default();

        while let Some(event) = self.queue.next().await {
            let sink = &self.sink;
            let event = &event;
            let result = (|| async move { sink.apply(event).await })
                .retry(self.retry.backoff())
                .notify(|err: &SinkError, delay: Duration| {
                    warn!(
                        kind = event.kind(),
                        channel = ?event.channel(),
                        error = %err,
                        ?delay,
                        "Sink apply failed, retrying"
                    );
                })
                .await;

            match result {
                Ok(()) => {
                    stats.applied += 1;
                    debug!(kind = event.kind(), channel = ?event.channel(), "Sink event applied");
                }
                Err(e) => {
                    stats.failed += 1;
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        kind = event.kind(),
                        channel = ?event.channel(),
                        error = %e,
                        "Sink event abandoned after retries"
                    );
                }
            }
        }

        info!(
            sink = self.sink.name(),
            applied = stats.applied,
            failed = stats.failed,
            "Durability worker stopped"
        );
        stats
    }
}
