//! Folding a stream into a single value.
//!
//! [`ReduceStage`] is a sink: it consumes items and produces no item stream. Its result is a
//! [`CompletionFuture`] that settles once upstream ends (fulfilled with the accumulator) or
//! once any fold step or upstream fails (rejected with that error).

use std::future::Future;
use std::pin::pin;

use futures::stream::{Stream, StreamExt};

use crate::completion::{completion, CompletionFuture, Settler};
use crate::error::ConfigResult;
use crate::execution::{FailureSource, StageContext, StageEvent, StageOptions};
use crate::types::Outcome;

type FoldFn<T, R, E> = Box<dyn FnMut(R, T) -> Outcome<R, E> + Send>;

/// Lifecycle of a [`ReduceStage`].
///
/// `Idle → Accumulating → {Finished, Failed}`; the two terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceState {
    /// Constructed, no item seen yet.
    Idle,
    /// At least one item folded, upstream still open.
    Accumulating,
    /// Upstream ended cleanly; the result is fulfilled.
    Finished,
    /// A fold step or upstream failed; the result is rejected.
    Failed,
}

/// Left fold over a stream of `T` into an `R`.
pub struct ReduceStage<T, R, E> {
    g: FoldFn<T, R, E>,
    // `None` only while a fold step is in flight or after finishing.
    acc: Option<R>,
    state: ReduceState,
    failure: Option<E>,
    settler: Settler<R, E>,
    ctx: StageContext,
}

impl<T, R, E> ReduceStage<T, R, E>
where
    T: Send + 'static,
    R: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Fold with a synchronous combining function, starting from `init`.
    pub fn new<G>(mut g: G, init: R) -> Self
    where
        G: FnMut(R, T) -> Result<R, E> + Send + 'static,
    {
        Self::from_outcome(move |acc, item| Outcome::Ready(g(acc, item)), init)
    }

    /// Fold with a combining function returning a future.
    pub fn from_async<G, Fut>(mut g: G, init: R) -> Self
    where
        G: FnMut(R, T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::from_outcome(move |acc, item| Outcome::pending(g(acc, item)), init)
    }

    /// Fold with a synchronous combining function, starting from `R::default()`.
    pub fn with_default<G>(g: G) -> Self
    where
        R: Default,
        G: FnMut(R, T) -> Result<R, E> + Send + 'static,
    {
        Self::new(g, R::default())
    }

    /// Fold with a combining function that decides per item whether to answer now or later.
    pub fn from_outcome<G>(g: G, init: R) -> Self
    where
        G: FnMut(R, T) -> Outcome<R, E> + Send + 'static,
    {
        let (settler, _) = completion();
        Self {
            g: Box::new(g),
            acc: Some(init),
            state: ReduceState::Idle,
            failure: None,
            settler,
            ctx: StageContext::new("reduce"),
        }
    }

    /// Replace the stage name/observer.
    pub fn with_options(mut self, opts: StageOptions) -> ConfigResult<Self> {
        self.ctx = opts.into_context("reduce")?;
        Ok(self)
    }

    /// Where the stage is in its lifecycle.
    pub fn state(&self) -> ReduceState {
        self.state
    }

    /// Name, observer and metrics of this stage.
    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// A handle to the final result. Every handle observes the same outcome.
    pub fn result(&self) -> CompletionFuture<R, E> {
        self.settler.handle()
    }

    /// Fold one item into the accumulator.
    ///
    /// Once the stage has failed, returns the failure again without calling the combining
    /// function.
    ///
    /// # Panics
    ///
    /// Panics if called after [`Self::finish`], or if a previous `feed` future was dropped
    /// before it completed (the accumulator went with it).
    pub async fn feed(&mut self, item: T) -> Result<(), E> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        assert!(
            self.state != ReduceState::Finished,
            "item fed to reduce stage '{}' after end of input",
            self.ctx.name()
        );

        let acc = self.take_acc();
        self.state = ReduceState::Accumulating;
        self.ctx.record(StageEvent::ItemReceived);

        match (self.g)(acc, item).resolve().await {
            Ok(next) => {
                self.acc = Some(next);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone(), FailureSource::Callback);
                Err(e)
            }
        }
    }

    /// Signal end of input: fulfil the result with the accumulator.
    ///
    /// Has no effect if the stage already failed or finished.
    ///
    /// # Panics
    ///
    /// Panics if a previous `feed` future was dropped before it completed.
    pub fn finish(&mut self) -> CompletionFuture<R, E> {
        if matches!(self.state, ReduceState::Idle | ReduceState::Accumulating) {
            let acc = self.take_acc();
            self.state = ReduceState::Finished;
            self.settler.fulfill(acc);
            self.ctx.record(StageEvent::Settled { fulfilled: true });
        }
        self.result()
    }

    /// Signal an upstream failure: reject the result with `error`.
    ///
    /// Has no effect if the stage already failed or finished.
    pub fn abort(&mut self, error: E) -> CompletionFuture<R, E> {
        if matches!(self.state, ReduceState::Idle | ReduceState::Accumulating) {
            self.acc = None;
            self.fail(error, FailureSource::Upstream);
        }
        self.result()
    }

    /// Consume `upstream` to the end (or to its first error) and wait for the result.
    pub async fn drive<St>(mut self, upstream: St) -> Result<R, E>
    where
        R: Clone,
        St: Stream<Item = Result<T, E>> + Send,
    {
        let result = self.result();
        let mut upstream = pin!(upstream);
        while let Some(next) = upstream.next().await {
            match next {
                Ok(item) => {
                    if self.feed(item).await.is_err() {
                        return result.await;
                    }
                }
                Err(e) => {
                    return self.abort(e).await;
                }
            }
        }
        self.finish().await
    }

    fn take_acc(&mut self) -> R {
        match self.acc.take() {
            Some(acc) => acc,
            None => panic!(
                "reduce stage '{}' lost its accumulator: a fold step was cancelled mid-flight",
                self.ctx.name()
            ),
        }
    }

    fn fail(&mut self, error: E, source: FailureSource) {
        self.state = ReduceState::Failed;
        self.failure = Some(error.clone());
        self.ctx.record(StageEvent::Failed { source });
        self.settler.reject(error);
        self.ctx.record(StageEvent::Settled { fulfilled: false });
    }
}
