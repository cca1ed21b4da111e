//! Runs an action and carries one invocation through its lifecycle.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, debug_span, trace, warn, Span};
use uuid::Uuid;

use super::adapter::ResultAdapter;
use super::outcome::Outcome;
use super::state::ExecutionState;
use crate::defer::{drain, DeferHandle, DrainContext, DrainReport};
use crate::diagnostics::DiagnosticSink;
use crate::errors::{normalize, CapturedError, Thrown};

/// What an action hands back: already settled, or still pending.
pub enum Settlement<'a, T> {
    /// The action finished synchronously.
    Ready(anyhow::Result<T>),
    /// The action returned a future that settles later.
    Pending(BoxFuture<'a, anyhow::Result<T>>),
}

impl<'a, T: 'a> Settlement<'a, T> {
    /// Wraps a synchronous result.
    pub fn ready<E>(result: Result<T, E>) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Ready(result.map_err(Into::into))
    }

    /// Wraps a future; cleanup waits for it to settle.
    pub fn pending<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
        E: Into<anyhow::Error>,
    {
        Self::Pending(async move { future.await.map_err(Into::into) }.boxed())
    }

    /// Returns true for a pending settlement.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl<T> std::fmt::Debug for Settlement<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Settlement::Ready"),
            Self::Pending(_) => f.write_str("Settlement::Pending"),
        }
    }
}

/// Values an action may return.
///
/// Implemented for `Result<T, E>` (settled now) and [`Settlement`] (either
/// form). The engine looks at the returned value, not at how the action
/// was written, to decide whether to drain now or after a future settles.
pub trait IntoSettlement<'a, T> {
    /// Converts into a settlement.
    fn into_settlement(self) -> Settlement<'a, T>;
}

impl<'a, T> IntoSettlement<'a, T> for Settlement<'a, T> {
    fn into_settlement(self) -> Settlement<'a, T> {
        self
    }
}

impl<'a, T, E> IntoSettlement<'a, T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn into_settlement(self) -> Settlement<'a, T> {
        Settlement::Ready(self.map_err(Into::into))
    }
}

/// Where an action stands right after it was called.
pub(crate) enum Step<'a, T> {
    Settled(Outcome<T>),
    Pending(BoxFuture<'a, Outcome<T>>),
}

pub(crate) fn outcome_of<T>(result: anyhow::Result<T>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::Success(value),
        Err(err) => Outcome::Failure(normalize(Thrown::Error(err))),
    }
}

/// Awaits an action future, turning errors and panics into an outcome.
pub(crate) async fn settle<F, T>(future: F) -> Outcome<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => outcome_of(result),
        Err(payload) => Outcome::Failure(normalize(Thrown::Panic(payload))),
    }
}

/// Calls a synchronous function, turning panics into an error.
pub(crate) fn call<F, O>(f: F) -> Result<O, CapturedError>
where
    F: FnOnce() -> O,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| normalize(Thrown::Panic(payload)))
}

/// One run of an action: its queue, its state, its tracing span.
pub(crate) struct Invocation {
    handle: DeferHandle,
    state: ExecutionState,
    drain: DrainContext,
    span: Span,
}

impl Invocation {
    pub(crate) fn start(sink: Arc<dyn DiagnosticSink>, label: Option<String>) -> Self {
        let invocation_id = Uuid::new_v4();
        let span = debug_span!(
            "deferflow.invocation",
            invocation_id = %invocation_id,
            label = label.as_deref().unwrap_or("")
        );
        Self {
            handle: DeferHandle::new(),
            state: ExecutionState::Idle,
            drain: DrainContext {
                sink,
                invocation_id,
                label,
            },
            span,
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Runs an action that may return either settlement form.
    pub(crate) fn execute<'a, T, A, S>(&mut self, action: A) -> Step<'a, T>
    where
        A: FnOnce(DeferHandle) -> S,
        S: IntoSettlement<'a, T>,
        T: 'a,
    {
        match self.invoke(|handle| action(handle).into_settlement()) {
            Err(error) => Step::Settled(Outcome::Failure(error)),
            Ok(Settlement::Ready(result)) => Step::Settled(outcome_of(result)),
            Ok(Settlement::Pending(future)) => Step::Pending(settle(future).boxed()),
        }
    }

    /// Runs an action known to finish synchronously.
    pub(crate) fn execute_ready<T, E, A>(&mut self, action: A) -> Outcome<T>
    where
        A: FnOnce(DeferHandle) -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        match self.invoke(action) {
            Ok(result) => outcome_of(result.map_err(Into::into)),
            Err(error) => Outcome::Failure(error),
        }
    }

    /// Drains cleanup, then shapes the outcome. Shared by the ready and
    /// pending paths.
    pub(crate) fn finish<T, R>(mut self, outcome: Outcome<T>, adapter: R, after_await: bool) -> R::Output
    where
        R: ResultAdapter<T>,
    {
        self.transition(if after_await {
            ExecutionState::DrainingAsync
        } else {
            ExecutionState::Draining
        });
        let report = self.drain_queue();
        trace!(
            parent: &self.span,
            invoked = report.invoked,
            failed = report.failed,
            detached = report.detached,
            "Cleanup finished"
        );
        self.transition(ExecutionState::Settled {
            success: outcome.is_success(),
        });
        adapter.adapt(outcome)
    }

    fn invoke<A, O>(&mut self, action: A) -> Result<O, CapturedError>
    where
        A: FnOnce(DeferHandle) -> O,
    {
        self.transition(ExecutionState::Running);
        let _entered = self.span.enter();
        let handle = self.handle.clone();
        call(move || action(handle))
    }

    fn drain_queue(&self) -> DrainReport {
        let _entered = self.span.enter();
        drain(self.handle.queue(), &self.drain)
    }

    fn transition(&mut self, next: ExecutionState) {
        let legal = self.state.can_transition_to(next);
        debug_assert!(legal, "invalid transition {} -> {}", self.state, next);
        if !legal {
            warn!(
                parent: &self.span,
                from = %self.state,
                to = %next,
                "Invalid invocation state transition"
            );
        }
        trace!(parent: &self.span, from = %self.state, to = %next, "Invocation state changed");
        self.state = next;
    }
}

impl Drop for Invocation {
    /// Runs cleanup for an invocation abandoned before it settled, e.g. a
    /// pending completion that was dropped or timed out.
    fn drop(&mut self) {
        if matches!(self.state, ExecutionState::Settled { .. }) {
            return;
        }
        debug!(
            parent: &self.span,
            state = %self.state,
            "Invocation dropped before settling, running cleanup"
        );
        let report = self.drain_queue();
        trace!(
            parent: &self.span,
            invoked = report.invoked,
            failed = report.failed,
            detached = report.detached,
            "Cleanup finished"
        );
    }
}
