//! Running stages over `futures` streams.
//!
//! This module sits "above" [`crate::processing`] and provides:
//!
//! - [`StageStreamExt`]: plugs a [`Stage`] into any `Stream<Item = Result<T, E>>`
//! - [`StageOptions`]: per-stage name and observer
//! - Live metrics + observer hooks for monitoring
//!
//! The driver pulls one upstream item at a time and does not pull the next until every
//! output of the previous item has been taken downstream. That is the whole backpressure
//! mechanism: a stage never holds more than one in-flight item.

mod observer;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};

use crate::error::{ConfigResult, StageConfigError};
use crate::processing::{ReduceStage, Stage};
use crate::types::Emitter;

pub use observer::{
    CompositeStageObserver, FailureSource, StageEvent, StageMetrics, StageMetricsSnapshot,
    StageObserver, TracingObserver,
};

/// Configuration shared by every stage.
#[derive(Clone, Default)]
pub struct StageOptions {
    /// Label used in logs and observer callbacks.
    ///
    /// If `None`, the stage kind is used (`"map"`, `"filter"`, `"batch"`, `"reduce"`).
    pub name: Option<String>,
    /// Receives every [`StageEvent`] the stage produces.
    pub observer: Option<Arc<dyn StageObserver>>,
}

impl StageOptions {
    /// Options with a custom stage name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            observer: None,
        }
    }

    /// Attach an observer.
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub(crate) fn into_context(self, kind: &'static str) -> ConfigResult<StageContext> {
        let name: Arc<str> = match self.name {
            Some(name) if name.trim().is_empty() => return Err(StageConfigError::BlankName),
            Some(name) => name.into(),
            None => kind.into(),
        };
        Ok(StageContext {
            name,
            observer: self.observer,
            metrics: Arc::new(StageMetrics::new()),
        })
    }
}

impl fmt::Debug for StageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageOptions")
            .field("name", &self.name)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

/// Per-stage instrumentation: name, observer and metrics.
pub struct StageContext {
    name: Arc<str>,
    observer: Option<Arc<dyn StageObserver>>,
    metrics: Arc<StageMetrics>,
}

impl StageContext {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            name: kind.into(),
            observer: None,
            metrics: Arc::new(StageMetrics::new()),
        }
    }

    /// The stage label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle to this stage's live metrics.
    pub fn metrics(&self) -> Arc<StageMetrics> {
        Arc::clone(&self.metrics)
    }

    pub(crate) fn record(&self, event: StageEvent) {
        self.metrics.record(&event);
        if let StageEvent::Failed { source } = &event {
            tracing::warn!(stage = %self.name, ?source, "stage terminated");
        }
        if let Some(obs) = &self.observer {
            obs.on_event(&self.name, &event);
        }
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("name", &self.name)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

struct Driver<St, S: Stage> {
    upstream: Pin<Box<St>>,
    stage: S,
    out: Emitter<S::Output>,
    done: bool,
}

impl<St, S> Driver<St, S>
where
    St: Stream<Item = Result<S::Input, S::Error>> + Send,
    S: Stage,
{
    /// Produce the next downstream item, pulling from upstream only when nothing is queued.
    async fn next(&mut self) -> Option<Result<S::Output, S::Error>> {
        loop {
            if let Some(item) = self.out.take_next() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }

            match self.upstream.next().await {
                Some(Ok(item)) => {
                    if let Err(e) = self.stage.transform(item, &mut self.out).await {
                        self.terminate();
                        return Some(Err(e));
                    }
                }
                Some(Err(e)) => {
                    self.stage.context().record(StageEvent::Failed {
                        source: FailureSource::Upstream,
                    });
                    self.stage.abort();
                    self.terminate();
                    return Some(Err(e));
                }
                None => {
                    self.stage.flush(&mut self.out);
                    self.stage.context().record(StageEvent::Flushed {
                        emitted: self.out.len(),
                    });
                    self.done = true;
                }
            }
        }
    }

    fn terminate(&mut self) {
        self.done = true;
        // Nothing is emitted after a fatal error.
        self.out.drain().for_each(drop);
    }
}

/// Extension methods for plugging stages into result streams.
pub trait StageStreamExt<T: Send, E: Send>: Stream<Item = Result<T, E>> + Send + Sized {
    /// Run every item through `stage`, yielding its outputs in order.
    ///
    /// The returned stream yields at most one `Err`, after which it ends.
    fn through<S>(self, stage: S) -> impl Stream<Item = Result<S::Output, E>> + Send
    where
        S: Stage<Input = T, Error = E>,
    {
        let driver = Driver {
            upstream: Box::pin(self),
            stage,
            out: Emitter::new(),
            done: false,
        };
        stream::unfold(driver, |mut driver| async move {
            let item = driver.next().await?;
            Some((item, driver))
        })
    }

    /// Fold the whole stream into `reduce` and wait for its result.
    fn fold_into<R>(self, reduce: ReduceStage<T, R, E>) -> impl Future<Output = Result<R, E>> + Send
    where
        T: 'static,
        R: Clone + Send + Sync + 'static,
        E: Clone + Sync + 'static,
    {
        reduce.drive(self)
    }

    /// Collect every item, stopping at the first error.
    fn collect_ok(self) -> impl Future<Output = Result<Vec<T>, E>> + Send {
        async move {
            let mut items = Vec::new();
            let mut this = Box::pin(self);
            while let Some(next) = this.next().await {
                items.push(next?);
            }
            Ok(items)
        }
    }
}

impl<St, T: Send, E: Send> StageStreamExt<T, E> for St where St: Stream<Item = Result<T, E>> + Send {}
