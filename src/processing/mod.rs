//! Streaming transformations.
//!
//! Each primitive processes one item at a time, in arrival order, and only asks for the next
//! item once the current one is fully handled (including any `await` on a user callback).
//!
//! Currently implemented:
//!
//! - [`MapStage`]: one output per input, through a user function
//! - [`FilterStage`]: passes items for which a predicate holds
//! - [`BatchStage`]: groups consecutive items into fixed-size `Vec`s
//! - [`ReduceStage`]: folds everything into one value exposed as a [`crate::completion::CompletionFuture`]
//!
//! Callbacks may be synchronous (`new`) or asynchronous (`from_async`). Either way a callback
//! failure is fatal to the stage and the caller's error value is passed on unchanged.
//!
//! ## Example: map → filter → batch
//!
//! ```rust
//! use futures::stream;
//! use stream_stages::execution::StageStreamExt;
//! use stream_stages::processing::{BatchStage, FilterStage, MapStage};
//!
//! # futures::executor::block_on(async {
//! let input = stream::iter((0..7).map(Ok::<u32, String>));
//!
//! let batches = input
//!     .through(MapStage::new(|n: u32| Ok(n * 10)))
//!     .through(FilterStage::new(|n: &u32| Ok(*n != 30)))
//!     .through(BatchStage::new(2).unwrap())
//!     .collect_ok()
//!     .await;
//!
//! assert_eq!(batches, Ok(vec![vec![0, 10], vec![20, 40], vec![50, 60]]));
//! # });
//! ```

pub mod batch;
pub mod filter;
pub mod map;
pub mod reduce;

use std::future::Future;
use std::sync::Arc;

use crate::execution::{StageContext, StageMetrics};
use crate::types::Emitter;

pub use batch::BatchStage;
pub use filter::FilterStage;
pub use map::MapStage;
pub use reduce::{ReduceStage, ReduceState};

/// One transform step in a pipeline.
///
/// A stage receives items through [`Stage::transform`], one at a time; the driver never calls
/// `transform` again before the previous future has completed. Outputs go to the [`Emitter`].
pub trait Stage: Send {
    type Input: Send;
    type Output: Send;
    type Error: Send;

    /// Process one item, emitting zero or more outputs.
    ///
    /// Returning an error terminates the stage: the driver forwards the error downstream and
    /// never calls the stage again.
    fn transform<'a>(
        &'a mut self,
        item: Self::Input,
        out: &'a mut Emitter<Self::Output>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

    /// Called once when upstream ends without error.
    fn flush(&mut self, _out: &mut Emitter<Self::Output>) {}

    /// Called once when upstream fails. Buffered state must be dropped.
    fn abort(&mut self) {}

    /// Name, observer and metrics shared by every event this stage records.
    fn context(&self) -> &StageContext;

    /// The stage label used in logs and observer callbacks.
    fn name(&self) -> &str {
        self.context().name()
    }

    /// A handle to this stage's live metrics.
    fn metrics(&self) -> Arc<StageMetrics> {
        self.context().metrics()
    }
}
