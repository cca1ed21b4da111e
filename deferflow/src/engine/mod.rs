//! The deferred-execution engine.
//!
//! An action receives a [`DeferHandle`], registers cleanup callbacks, and
//! returns either a `Result` or a [`Settlement`]. Once the action settles the
//! engine drains the callbacks in registration order, then shapes the
//! outcome with a [`ResultAdapter`]:
//!
//! - [`ValueReturn`] gives a two-slot [`Captured`]
//! - [`Reraise`] gives `Result<T, CapturedError>`
//! - [`Dispatch`] calls an error handler and gives `()`
//!
//! ```rust
//! use deferflow::prelude::*;
//!
//! let captured = run_capturing_sync(|defer| {
//!     defer.defer(|| println!("cleaned up"));
//!     anyhow::Ok(42)
//! });
//! assert_eq!(captured.value(), Some(&42));
//! ```

mod adapter;
mod attempt;
mod completion;
mod executor;
mod integration_tests;
mod outcome;
mod state;

pub use adapter::{Dispatch, Reraise, ResultAdapter, ValueReturn};
pub use attempt::{attempt, attempt_async, attempt_propagating};
pub use completion::Completion;
pub use executor::{IntoSettlement, Settlement};
pub use outcome::{Captured, Outcome};
pub use state::ExecutionState;

use futures::FutureExt;
use std::sync::Arc;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::defer::DeferHandle;
use crate::diagnostics::{global_diagnostic_sink, DiagnosticSink, TracingDiagnosticSink};
use crate::errors::CapturedError;
use executor::{Invocation, Step};

/// Runs actions with deferred cleanup.
///
/// An engine is cheap to clone and holds no per-run state; every `run*`
/// call gets its own queue.
#[derive(Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Engine {
    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self { config, sink: None }
    }

    /// Routes cleanup diagnostics to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the sink diagnostics go to: the injected one, else the
    /// process-wide one (if enabled), else a tracing sink.
    pub fn diagnostic_sink(&self) -> Arc<dyn DiagnosticSink> {
        if let Some(sink) = &self.sink {
            return sink.clone();
        }
        self.config
            .use_global_sink
            .then(global_diagnostic_sink)
            .flatten()
            .unwrap_or_else(|| Arc::new(TracingDiagnosticSink::new(self.config.diagnostic_level)))
    }

    fn invocation(&self) -> Invocation {
        Invocation::start(self.diagnostic_sink(), self.config.label.clone())
    }

    /// Runs `action` and shapes its outcome with `adapter`.
    ///
    /// The completion is ready if the action returned a `Result` or a
    /// ready [`Settlement`]; otherwise it resolves after the action's future
    /// settles and cleanup has run.
    pub fn run<'a, T, A, S, R>(&self, adapter: R, action: A) -> Completion<'a, R::Output>
    where
        A: FnOnce(DeferHandle) -> S,
        S: IntoSettlement<'a, T>,
        T: Send + 'a,
        R: ResultAdapter<T> + Send + 'a,
        R::Output: 'a,
    {
        let mut invocation = self.invocation();
        match invocation.execute(action) {
            Step::Settled(outcome) => Completion::ready(invocation.finish(outcome, adapter, false)),
            Step::Pending(future) => {
                let span = invocation.span().clone();
                Completion::pending(
                    async move {
                        let outcome = future.await;
                        invocation.finish(outcome, adapter, true)
                    }
                    .instrument(span)
                    .boxed(),
                )
            }
        }
    }

    /// Runs a synchronous action and shapes its outcome with `adapter`.
    pub fn run_sync<T, E, A, R>(&self, adapter: R, action: A) -> R::Output
    where
        A: FnOnce(DeferHandle) -> Result<T, E>,
        E: Into<anyhow::Error>,
        R: ResultAdapter<T>,
    {
        let mut invocation = self.invocation();
        let outcome = invocation.execute_ready(action);
        invocation.finish(outcome, adapter, false)
    }

    /// Runs `action`, returning a two-slot [`Captured`].
    pub fn run_capturing<'a, T, A, S>(&self, action: A) -> Completion<'a, Captured<T>>
    where
        A: FnOnce(DeferHandle) -> S,
        S: IntoSettlement<'a, T>,
        T: Send + 'a,
    {
        self.run(ValueReturn, action)
    }

    /// Runs `action`, returning its value or its error as `Err`.
    pub fn run_propagating<'a, T, A, S>(&self, action: A) -> Completion<'a, Result<T, CapturedError>>
    where
        A: FnOnce(DeferHandle) -> S,
        S: IntoSettlement<'a, T>,
        T: Send + 'a,
    {
        self.run(Reraise, action)
    }

    /// Runs `action`, calling `on_error` once if it fails.
    pub fn run_handled<'a, T, H, A, S>(&self, on_error: H, action: A) -> Completion<'a, ()>
    where
        H: FnOnce(CapturedError) + Send + 'a,
        A: FnOnce(DeferHandle) -> S,
        S: IntoSettlement<'a, T>,
        T: Send + 'a,
    {
        self.run(Dispatch::new(on_error), action)
    }

    /// Synchronous form of [`run_capturing`](Self::run_capturing).
    pub fn run_capturing_sync<T, E, A>(&self, action: A) -> Captured<T>
    where
        A: FnOnce(DeferHandle) -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        self.run_sync(ValueReturn, action)
    }

    /// Synchronous form of [`run_propagating`](Self::run_propagating).
    pub fn run_propagating_sync<T, E, A>(&self, action: A) -> Result<T, CapturedError>
    where
        A: FnOnce(DeferHandle) -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        self.run_sync(Reraise, action)
    }

    /// Synchronous form of [`run_handled`](Self::run_handled).
    pub fn run_handled_sync<T, E, H, A>(&self, on_error: H, action: A)
    where
        H: FnOnce(CapturedError),
        A: FnOnce(DeferHandle) -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        self.run_sync(Dispatch::new(on_error), action);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("injected_sink", &self.sink.is_some())
            .finish()
    }
}

/// Runs `action` on a default engine, returning a two-slot [`Captured`].
pub fn run_capturing<'a, T, A, S>(action: A) -> Completion<'a, Captured<T>>
where
    A: FnOnce(DeferHandle) -> S,
    S: IntoSettlement<'a, T>,
    T: Send + 'a,
{
    Engine::new().run_capturing(action)
}

/// Runs `action` on a default engine, returning its value or `Err`.
pub fn run_propagating<'a, T, A, S>(action: A) -> Completion<'a, Result<T, CapturedError>>
where
    A: FnOnce(DeferHandle) -> S,
    S: IntoSettlement<'a, T>,
    T: Send + 'a,
{
    Engine::new().run_propagating(action)
}

/// Runs `action` on a default engine, calling `on_error` on failure.
pub fn run_handled<'a, T, H, A, S>(on_error: H, action: A) -> Completion<'a, ()>
where
    H: FnOnce(CapturedError) + Send + 'a,
    A: FnOnce(DeferHandle) -> S,
    S: IntoSettlement<'a, T>,
    T: Send + 'a,
{
    Engine::new().run_handled(on_error, action)
}

/// Synchronous [`run_capturing`] on a default engine.
pub fn run_capturing_sync<T, E, A>(action: A) -> Captured<T>
where
    A: FnOnce(DeferHandle) -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    Engine::new().run_capturing_sync(action)
}

/// Synchronous [`run_propagating`] on a default engine.
pub fn run_propagating_sync<T, E, A>(action: A) -> Result<T, CapturedError>
where
    A: FnOnce(DeferHandle) -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    Engine::new().run_propagating_sync(action)
}

/// Synchronous [`run_handled`] on a default engine.
pub fn run_handled_sync<T, E, H, A>(on_error: H, action: A)
where
    H: FnOnce(CapturedError),
    A: FnOnce(DeferHandle) -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    Engine::new().run_handled_sync(on_error, action);
}
