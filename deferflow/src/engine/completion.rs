//! The engine's return value: ready now, or a future that resolves later.

use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

enum CompletionState<'a, R> {
    Ready(Option<R>),
    Pending(BoxFuture<'a, R>),
}

/// Result of an engine run.
///
/// Ready when the action settled synchronously (cleanup has already run),
/// pending when it returned a future. Either way it can be awaited.
#[must_use = "a pending completion does nothing unless awaited"]
pub struct Completion<'a, R> {
    state: CompletionState<'a, R>,
}

impl<'a, R> Completion<'a, R> {
    pub(crate) fn ready(result: R) -> Self {
        Self {
            state: CompletionState::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(future: BoxFuture<'a, R>) -> Self {
        Self {
            state: CompletionState::Pending(future),
        }
    }

    /// Returns true if the result is available without awaiting.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, CompletionState::Ready(Some(_)))
    }

    /// Returns the result if ready, or gives the completion back.
    pub fn into_ready(self) -> Result<R, Self> {
        match self.state {
            CompletionState::Ready(Some(result)) => Ok(result),
            state => Err(Self { state }),
        }
    }

    /// Returns the result, blocking the current thread if still pending.
    ///
    /// Do not call this on a pending completion from inside an async
    /// runtime; await it instead.
    pub fn wait(self) -> R {
        match self.state {
            CompletionState::Ready(Some(result)) => result,
            state => futures::executor::block_on(Self { state }),
        }
    }
}

impl<R> Unpin for Completion<'_, R> {}

/// # Panics
///
/// Polling a ready completion again after it returned its result panics.
impl<R> Future for Completion<'_, R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        match &mut self.get_mut().state {
            CompletionState::Ready(slot) => match slot.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("Completion polled after it resolved"),
            },
            CompletionState::Pending(future) => future.as_mut().poll(cx),
        }
    }
}

impl<R> std::fmt::Debug for Completion<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            CompletionState::Ready(Some(_)) => "ready",
            CompletionState::Ready(None) => "consumed",
            CompletionState::Pending(_) => "pending",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}
