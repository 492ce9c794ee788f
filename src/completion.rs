//! Settle-once completion handle.
//!
//! A [`CompletionFuture`] bridges a push-style terminal event (a stream ending or failing) to
//! callers that want to `await` a final value. It starts pending and moves to either
//! fulfilled or rejected exactly once; the [`Settler`] half is the only writer.
//!
//! Delivery to awaiting tasks goes through a `futures` oneshot channel whose receiver is
//! [`Shared`], so any number of handles can await the same outcome.
//!
//! ```rust
//! use stream_stages::completion::completion;
//!
//! let (mut settler, fut) = completion::<u32, String>();
//! assert!(!fut.is_settled());
//! assert!(settler.fulfill(3));
//! assert!(!settler.reject("too late".to_string()));
//! assert_eq!(fut.peek(), Some(Ok(3)));
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

type Outcome<R, E> = Arc<Result<R, E>>;
type Continuation<R, E> = Box<dyn FnOnce(&Result<R, E>) + Send>;

enum Hooks<R, E> {
    Pending(Vec<Continuation<R, E>>),
    Settled(Outcome<R, E>),
}

/// Synchronous `then`/`catch` continuations. Awaiting tasks are served by the channel.
struct Continuations<R, E> {
    hooks: Mutex<Hooks<R, E>>,
}

impl<R, E> Continuations<R, E> {
    fn lock(&self) -> MutexGuard<'_, Hooks<R, E>> {
        // Continuations never run under the lock, so a poisoned state is still consistent.
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, continuation: Continuation<R, E>) {
        let settled = match &mut *self.lock() {
            Hooks::Settled(outcome) => Arc::clone(outcome),
            Hooks::Pending(pending) => {
                pending.push(continuation);
                return;
            }
        };
        continuation(&settled);
    }

    fn settle(&self, outcome: &Outcome<R, E>) {
        let pending = match std::mem::replace(&mut *self.lock(), Hooks::Settled(Arc::clone(outcome))) {
            Hooks::Pending(pending) => pending,
            Hooks::Settled(_) => Vec::new(),
        };
        for continuation in pending {
            continuation(outcome);
        }
    }
}

/// Create a linked settler/future pair in the pending state.
pub fn completion<R, E>() -> (Settler<R, E>, CompletionFuture<R, E>) {
    let (sender, receiver) = oneshot::channel();
    let handle = CompletionFuture {
        delivery: receiver.shared(),
        continuations: Arc::new(Continuations {
            hooks: Mutex::new(Hooks::Pending(Vec::new())),
        }),
    };
    (
        Settler {
            sender: Some(sender),
            handle: handle.clone(),
        },
        handle,
    )
}

/// Write half of a completion pair.
///
/// Dropping a settler without settling leaves every handle pending forever.
pub struct Settler<R, E> {
    sender: Option<oneshot::Sender<Outcome<R, E>>>,
    handle: CompletionFuture<R, E>,
}

impl<R, E> Settler<R, E> {
    /// Settle with a value. Returns `false` if the future was already settled.
    pub fn fulfill(&mut self, value: R) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if the future was already settled.
    pub fn reject(&mut self, error: E) -> bool {
        self.settle(Err(error))
    }

    /// Returns `true` once either `fulfill` or `reject` has taken effect.
    pub fn is_settled(&self) -> bool {
        self.sender.is_none()
    }

    /// Another read handle for the same completion.
    pub fn handle(&self) -> CompletionFuture<R, E> {
        self.handle.clone()
    }

    fn settle(&mut self, outcome: Result<R, E>) -> bool {
        let Some(sender) = self.sender.take() else {
            return false;
        };
        let outcome = Arc::new(outcome);
        // Awaiting tasks are woken before any continuation runs, so a panicking
        // continuation cannot strand them. The receiver lives as long as `self.handle`.
        let _ = sender.send(Arc::clone(&outcome));
        self.handle.continuations.settle(&outcome);
        true
    }
}

impl<R, E> fmt::Debug for Settler<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Read half of a completion pair.
///
/// Handles are cheap to clone and all observe the same outcome. Awaiting a handle yields a
/// clone of the outcome, so any number of tasks may await it.
pub struct CompletionFuture<R, E> {
    delivery: Shared<oneshot::Receiver<Outcome<R, E>>>,
    continuations: Arc<Continuations<R, E>>,
}

impl<R, E> CompletionFuture<R, E> {
    fn settled(&self) -> Option<Outcome<R, E>> {
        match self.delivery.clone().now_or_never() {
            Some(Ok(outcome)) => Some(outcome),
            // A cancelled channel means the settler went away unsettled.
            Some(Err(oneshot::Canceled)) | None => None,
        }
    }

    /// Returns `true` once the future has been fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        self.settled().is_some()
    }

    /// Attach a continuation pair. Exactly one of them runs, exactly once.
    ///
    /// If the future is already settled the matching continuation runs before this returns;
    /// otherwise it runs on the thread that settles the future, in attachment order.
    pub fn then<F, G>(&self, on_fulfilled: F, on_rejected: G)
    where
        F: FnOnce(&R) + Send + 'static,
        G: FnOnce(&E) + Send + 'static,
    {
        self.continuations.attach(Box::new(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(error) => on_rejected(error),
        }));
    }

    /// Attach a continuation that only runs if the future is rejected.
    pub fn catch<G>(&self, on_rejected: G)
    where
        G: FnOnce(&E) + Send + 'static,
    {
        self.continuations.attach(Box::new(move |outcome| {
            if let Err(error) = outcome {
                on_rejected(error);
            }
        }));
    }
}

impl<R: Clone, E: Clone> CompletionFuture<R, E> {
    /// The settled outcome, or `None` while still pending.
    pub fn peek(&self) -> Option<Result<R, E>> {
        self.settled().map(|outcome| (*outcome).clone())
    }
}

impl<R, E> Clone for CompletionFuture<R, E> {
    fn clone(&self) -> Self {
        Self {
            delivery: self.delivery.clone(),
            continuations: Arc::clone(&self.continuations),
        }
    }
}

impl<R, E> fmt::Debug for CompletionFuture<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<R: Clone, E: Clone> Future for CompletionFuture<R, E> {
    type Output = Result<R, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.delivery.poll_unpin(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready((*outcome).clone()),
            // The settler was dropped unsettled: nothing will ever arrive.
            Poll::Ready(Err(oneshot::Canceled)) | Poll::Pending => Poll::Pending,
        }
    }
}
