//! `stream-stages` provides four composable streaming transforms for `futures` streams:
//! [`processing::MapStage`], [`processing::FilterStage`], [`processing::BatchStage`] and
//! [`processing::ReduceStage`].
//!
//! Every stage works on a `Stream<Item = Result<T, E>>`. An `Err` item is treated as a fatal
//! upstream failure, and the end of the stream is the end of input. Stages process exactly
//! one item at a time, so ordering and backpressure follow directly from the pull-based
//! stream protocol.
//!
//! ## Stages
//!
//! - **Map**: emits `f(item)` for every item; `f` may be synchronous or return a future
//! - **Filter**: emits the item itself when the predicate holds, nothing otherwise
//! - **Batch**: groups consecutive items into `Vec`s of a fixed size, with a shorter last batch
//! - **Reduce**: left fold into one value, surfaced as a [`completion::CompletionFuture`]
//!
//! A failing callback ends its stage. The caller's error value travels downstream unchanged;
//! for Reduce it also rejects the completion future.
//!
//! ## Quick example: map → reduce
//!
//! ```rust
//! use futures::stream;
//! use stream_stages::execution::StageStreamExt;
//! use stream_stages::processing::{MapStage, ReduceStage};
//!
//! # futures::executor::block_on(async {
//! let input = stream::iter((0u32..6).map(Ok::<_, String>));
//!
//! let joined = input
//!     .through(MapStage::from_async(|n: u32| async move { Ok(n * 2) }))
//!     .fold_into(ReduceStage::new(|acc: String, n: u32| Ok(acc + &n.to_string()), String::new()))
//!     .await;
//!
//! assert_eq!(joined, Ok("0246810".to_string()));
//! # });
//! ```
//!
//! ## Awaiting a reduce result from elsewhere
//!
//! ```rust
//! use stream_stages::processing::ReduceStage;
//!
//! # futures::executor::block_on(async {
//! let mut sum = ReduceStage::new(|acc: u64, n: u64| Ok::<_, String>(acc + n), 0);
//! let result = sum.result();
//! result.then(|v| println!("sum = {v}"), |e| eprintln!("failed: {e}"));
//!
//! for n in 1..=4 {
//!     sum.feed(n).await.unwrap();
//! }
//! sum.finish();
//! assert_eq!(result.await, Ok(10));
//! # });
//! ```
//!
//! ## Modules
//!
//! - [`processing`]: the stage trait and the four primitives
//! - [`execution`]: stream driver, stage options, observers and metrics
//! - [`completion`]: settle-once future used by Reduce
//! - [`types`]: callback outcome and emitter types
//! - [`error`]: configuration errors

pub mod completion;
pub mod error;
pub mod execution;
pub mod processing;
pub mod types;

pub use error::{ConfigResult, StageConfigError};
