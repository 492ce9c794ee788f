//! Fixed-size grouping.

use std::future::{self, Future};
use std::marker::PhantomData;

use crate::error::{ConfigResult, StageConfigError};
use crate::execution::{StageContext, StageEvent, StageOptions};
use crate::types::Emitter;

use super::Stage;

/// Groups consecutive items into `Vec`s of `batch_size`.
///
/// A full batch is emitted as soon as its last item arrives. When upstream ends, the
/// remaining items (if any) are emitted as one shorter batch. Items are held until then, so
/// a stream that neither ends nor fills a batch keeps its tail buffered.
///
/// `E` is only the error type of the surrounding pipeline; batching itself never fails.
pub struct BatchStage<T, E> {
    batch_size: usize,
    buffer: Vec<T>,
    ctx: StageContext,
    _error: PhantomData<fn() -> E>,
}

impl<T, E> BatchStage<T, E> {
    /// Create a batch stage.
    ///
    /// Returns [`StageConfigError::ZeroBatchSize`] if `batch_size == 0`.
    pub fn new(batch_size: usize) -> ConfigResult<Self> {
        if batch_size == 0 {
            return Err(StageConfigError::ZeroBatchSize);
        }
        Ok(Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            ctx: StageContext::new("batch"),
            _error: PhantomData,
        })
    }

    /// Replace the stage name/observer.
    pub fn with_options(mut self, opts: StageOptions) -> ConfigResult<Self> {
        self.ctx = opts.into_context("batch")?;
        Ok(self)
    }

    /// Number of items in every emitted batch except possibly the last.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of items waiting for their batch to fill.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn emit_buffer(&mut self, out: &mut Emitter<Vec<T>>) {
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        self.ctx.record(StageEvent::BatchEmitted { len: batch.len() });
        out.emit(batch);
    }
}

impl<T, E> Stage for BatchStage<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Output = Vec<T>;
    type Error = E;

    fn transform<'a>(
        &'a mut self,
        item: T,
        out: &'a mut Emitter<Vec<T>>,
    ) -> impl Future<Output = Result<(), E>> + Send + 'a {
        self.ctx.record(StageEvent::ItemReceived);
        self.buffer.push(item);
        if self.buffer.len() == self.batch_size {
            self.emit_buffer(out);
        }
        future::ready(Ok(()))
    }

    fn flush(&mut self, out: &mut Emitter<Vec<T>>) {
        if !self.buffer.is_empty() {
            self.emit_buffer(out);
        }
    }

    fn abort(&mut self) {
        self.buffer.clear();
    }

    fn context(&self) -> &StageContext {
        &self.ctx
    }
}
