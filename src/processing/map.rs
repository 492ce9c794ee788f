//! Item mapping.

use std::future::Future;
use std::marker::PhantomData;

use crate::error::ConfigResult;
use crate::execution::{FailureSource, StageContext, StageEvent, StageOptions};
use crate::types::{Emitter, Outcome};

use super::Stage;

type MapFn<T, U, E> = Box<dyn FnMut(T) -> Outcome<U, E> + Send>;

/// Emits `f(item)` for every input item.
pub struct MapStage<T, U, E> {
    f: MapFn<T, U, E>,
    ctx: StageContext,
    _types: PhantomData<fn(T) -> (U, E)>,
}

impl<T, U, E> MapStage<T, U, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    /// Map with a synchronous function.
    pub fn new<F>(mut f: F) -> Self
    where
        F: FnMut(T) -> Result<U, E> + Send + 'static,
    {
        Self::from_outcome(move |item| Outcome::Ready(f(item)))
    }

    /// Map with a function returning a future.
    pub fn from_async<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
    {
        Self::from_outcome(move |item| Outcome::pending(f(item)))
    }

    /// Map with a function that decides per item whether to answer now or later.
    pub fn from_outcome<F>(f: F) -> Self
    where
        F: FnMut(T) -> Outcome<U, E> + Send + 'static,
    {
        Self {
            f: Box::new(f),
            ctx: StageContext::new("map"),
            _types: PhantomData,
        }
    }

    /// Replace the stage name/observer.
    pub fn with_options(mut self, opts: StageOptions) -> ConfigResult<Self> {
        self.ctx = opts.into_context("map")?;
        Ok(self)
    }
}

impl<T, U, E> Stage for MapStage<T, U, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Output = U;
    type Error = E;

    fn transform<'a>(
        &'a mut self,
        item: T,
        out: &'a mut Emitter<U>,
    ) -> impl Future<Output = Result<(), E>> + Send + 'a {
        self.ctx.record(StageEvent::ItemReceived);
        let outcome = (self.f)(item);
        async move {
            match outcome.resolve().await {
                Ok(mapped) => {
                    out.emit(mapped);
                    self.ctx.record(StageEvent::ItemEmitted);
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
