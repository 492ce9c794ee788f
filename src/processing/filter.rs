//! Item filtering.

use std::future::Future;
use std::marker::PhantomData;

use crate::error::ConfigResult;
use crate::execution::{FailureSource, StageContext, StageEvent, StageOptions};
use crate::types::{Emitter, Outcome};

use super::Stage;

type PredicateFn<T, E> = Box<dyn FnMut(&T) -> Outcome<bool, E> + Send>;

/// Passes on the items for which `predicate` returns `true`, unchanged and in order.
///
/// The predicate only borrows the item; the item itself is moved downstream, so what the
/// consumer receives is the exact value the producer sent.
pub struct FilterStage<T, E> {
    predicate: PredicateFn<T, E>,
    ctx: StageContext,
    _types: PhantomData<fn(T) -> E>,
}

impl<T, E> FilterStage<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Filter with a synchronous predicate.
    pub fn new<P>(mut predicate: P) -> Self
    where
        P: FnMut(&T) -> Result<bool, E> + Send + 'static,
    {
        Self::from_outcome(move |item| Outcome::Ready(predicate(item)))
    }

    /// Filter with a predicate returning a future.
    ///
    /// The future must not borrow the item; copy out whatever it needs.
    pub fn from_async<P, Fut>(mut predicate: P) -> Self
    where
        P: FnMut(&T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
    {
        Self::from_outcome(move |item| Outcome::pending(predicate(item)))
    }

    /// Filter with a predicate that decides per item whether to answer now or later.
    pub fn from_outcome<P>(predicate: P) -> Self
    where
        P: FnMut(&T) -> Outcome<bool, E> + Send + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            ctx: StageContext::new("filter"),
            _types: PhantomData,
        }
    }

    /// Replace the stage name/observer.
    pub fn with_options(mut self, opts: StageOptions) -> ConfigResult<Self> {
        self.ctx = opts.into_context("filter")?;
        Ok(self)
    }
}

impl<T, E> Stage for FilterStage<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Output = T;
    type Error = E;

    fn transform<'a>(
        &'a mut self,
        item: T,
        out: &'a mut Emitter<T>,
    ) -> impl Future<Output = Result<(), E>> + Send + 'a {
        self.ctx.record(StageEvent::ItemReceived);
        let verdict = (self.predicate)(&item);
        async move {
            match verdict.resolve().await {
                Ok(true) => {
                    out.emit(item);
                    self.ctx.record(StageEvent::ItemEmitted);
                    Ok(())
                }
                Ok(false) => {
                    self.ctx.record(StageEvent::ItemDiscarded);
                    Ok(())
                }
                Err(e) => {
                    self.ctx.record(StageEvent::Failed {
                        source: FailureSource::Callback,
                    });
                    Err(e)
                }
            }
        }
    }

    fn context(&self) -> &StageContext {
        &self.ctx
    }
}
