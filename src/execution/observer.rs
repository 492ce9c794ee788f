use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where a fatal stage failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSource {
    /// The user callback returned an error or its future resolved to one.
    Callback,
    /// An error arrived from the preceding stage.
    Upstream,
}

/// Events emitted by stages while they process items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    ItemReceived,
    ItemEmitted,
    ItemDiscarded,
    BatchEmitted { len: usize },
    Flushed { emitted: usize },
    Failed { source: FailureSource },
    Settled { fulfilled: bool },
}

/// Observer hook for stage events.
pub trait StageObserver: Send + Sync {
    fn on_event(&self, stage: &str, event: &StageEvent);
}

/// An observer that fans out events to a list of observers.
#[derive(Default)]
pub struct CompositeStageObserver {
    observers: Vec<Arc<dyn StageObserver>>,
}

impl CompositeStageObserver {
    pub fn new(observers: Vec<Arc<dyn StageObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeStageObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeStageObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl StageObserver for CompositeStageObserver {
    fn on_event(&self, stage: &str, event: &StageEvent) {
        for o in &self.observers {
            o.on_event(stage, event);
        }
    }
}

/// Logs every stage event through `tracing` at `debug`.
///
/// Fatal failures are already logged at `warn` by the stage itself.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_event(&self, stage: &str, event: &StageEvent) {
        tracing::debug!(stage, ?event, "stage event");
    }
}

/// Live counters for a single stage.
///
/// Stages update these as they run; callers can snapshot them at any time.
pub struct StageMetrics {
    items_received: AtomicU64,
    items_emitted: AtomicU64,
    items_discarded: AtomicU64,
    batches_emitted: AtomicU64,
    failures: AtomicU64,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            items_received: AtomicU64::new(0),
            items_emitted: AtomicU64::new(0),
            items_discarded: AtomicU64::new(0),
            batches_emitted: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, event: &StageEvent) {
        let counter = match event {
            StageEvent::ItemReceived => &self.items_received,
            StageEvent::ItemEmitted => &self.items_emitted,
            StageEvent::ItemDiscarded => &self.items_discarded,
            StageEvent::BatchEmitted { .. } => &self.batches_emitted,
            StageEvent::Failed { .. } => &self.failures,
            StageEvent::Flushed { .. } | StageEvent::Settled { .. } => return,
        };
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            items_received: self.items_received.load(Ordering::Relaxed),
            items_emitted: self.items_emitted.load(Ordering::Relaxed),
            items_discarded: self.items_discarded.load(Ordering::Relaxed),
            batches_emitted: self.batches_emitted.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StageMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageMetrics").field(&self.snapshot()).finish()
    }
}

/// Immutable snapshot of [`StageMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMetricsSnapshot {
    pub items_received: u64,
    pub items_emitted: u64,
    pub items_discarded: u64,
    pub batches_emitted: u64,
    pub failures: u64,
}

impl fmt::Display for StageMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={}, emitted={}, discarded={}, batches={}, failures={}",
            self.items_received,
            self.items_emitted,
            self.items_discarded,
            self.batches_emitted,
            self.failures
        )
    }
}
