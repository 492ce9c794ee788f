//! Core types shared by every stage.
//!
//! User callbacks hand their results back as an [`Outcome`], which is either available
//! immediately or still pending. Stages push their output through an [`Emitter`].

use std::collections::VecDeque;
use std::fmt;

use futures::future::BoxFuture;

/// Result of a user callback: ready now, or pending on an asynchronous computation.
pub enum Outcome<T, E> {
    /// The callback returned synchronously.
    Ready(Result<T, E>),
    /// The callback returned a future that resolves later.
    Pending(BoxFuture<'static, Result<T, E>>),
}

impl<T, E> Outcome<T, E> {
    /// Wrap a synchronous success.
    pub fn ok(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    /// Wrap a synchronous failure.
    pub fn err(error: E) -> Self {
        Self::Ready(Err(error))
    }

    /// Wrap a future.
    pub fn pending<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::Pending(Box::pin(fut))
    }

    /// Returns `true` if no waiting is required to obtain the result.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Wait for the result.
    ///
    /// A ready outcome completes on the first poll without touching the executor.
    pub async fn resolve(self) -> Result<T, E> {
        match self {
            Self::Ready(res) => res,
            Self::Pending(fut) => fut.await,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(res: Result<T, E>) -> Self {
        Self::Ready(res)
    }
}

impl<T, E> fmt::Debug for Outcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(res) => f
                .debug_tuple("Ready")
                .field(&if res.is_ok() { "ok" } else { "err" })
                .finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Downstream side of a stage: collects zero or more output items per input item.
///
/// The driver drains the emitter in order before it asks upstream for the next item.
#[derive(Debug)]
pub struct Emitter<T> {
    queue: VecDeque<T>,
}

impl<T> Emitter<T> {
    /// Create an empty emitter.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Push one item downstream.
    pub fn emit(&mut self, item: T) {
        self.queue.push_back(item);
    }

    /// Number of emitted items not yet taken by the consumer.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is waiting to be consumed.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the oldest emitted item.
    pub fn take_next(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Drain every emitted item, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.queue.drain(..)
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
