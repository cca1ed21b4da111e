//! Drains a cleanup queue with per-callback failure isolation.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::queue::{Callback, DeferQueue};
use crate::diagnostics::{CleanupDiagnostic, CleanupFailureKind, DiagnosticSink};
use crate::errors::{normalize, CapturedError, Thrown};

/// Where diagnostics from one drain go, and how they are tagged.
#[derive(Clone)]
pub(crate) struct DrainContext {
    pub(crate) sink: Arc<dyn DiagnosticSink>,
    pub(crate) invocation_id: Uuid,
    pub(crate) label: Option<String>,
}

impl DrainContext {
    fn diagnostic(
        &self,
        kind: CleanupFailureKind,
        error: CapturedError,
        name: Option<String>,
        position: usize,
    ) -> CleanupDiagnostic {
        CleanupDiagnostic::new(kind, error)
            .with_callback(name)
            .with_position(position)
            .with_invocation(self.invocation_id, self.label.clone())
    }
}

/// Counts from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Callbacks invoked.
    pub invoked: usize,
    /// Callbacks that failed before the drain moved on.
    pub failed: usize,
    /// Async callbacks whose tails were still pending and got detached.
    pub detached: usize,
}

/// Runs every queued callback once, in registration order.
///
/// Never propagates a failure; each one is reported to the context's sink.
/// Returns an empty report if the queue was already drained.
pub(crate) fn drain(queue: &DeferQueue, ctx: &DrainContext) -> DrainReport {
    let mut report = DrainReport::default();
    let Some(entries) = queue.take_for_drain() else {
        return report;
    };

    for (position, entry) in entries.into_iter().enumerate() {
        report.invoked += 1;
        match entry.callback {
            Callback::Immediate(callback) => {
                let failure = match catch_unwind(AssertUnwindSafe(callback)) {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(normalize(Thrown::Error(err))),
                    Err(payload) => Some(normalize(Thrown::Panic(payload))),
                };
                if let Some(error) = failure {
                    report.failed += 1;
                    ctx.sink.try_emit(ctx.diagnostic(
                        CleanupFailureKind::Sync,
                        error,
                        entry.name,
                        position,
                    ));
                }
            }
            Callback::Pending(callback) => {
                let future = match catch_unwind(AssertUnwindSafe(callback)) {
                    Ok(future) => future,
                    Err(payload) => {
                        report.failed += 1;
                        ctx.sink.try_emit(ctx.diagnostic(
                            CleanupFailureKind::Sync,
                            normalize(Thrown::Panic(payload)),
                            entry.name,
                            position,
                        ));
                        continue;
                    }
                };

                // Run up to the first suspension point before moving on.
                let mut tail = AssertUnwindSafe(future).catch_unwind();
                let waker = futures::task::noop_waker();
                let mut cx = Context::from_waker(&waker);
                match tail.poll_unpin(&mut cx) {
                    Poll::Ready(result) => {
                        if let Some(error) = tail_failure(result) {
                            report.failed += 1;
                            ctx.sink.try_emit(ctx.diagnostic(
                                CleanupFailureKind::Async,
                                error,
                                entry.name,
                                position,
                            ));
                        }
                    }
                    Poll::Pending => {
                        report.detached += 1;
                        detach(tail, ctx.clone(), entry.name, position);
                    }
                }
            }
        }
    }

    debug!(
        invoked = report.invoked,
        failed = report.failed,
        detached = report.detached,
        "Cleanup queue drained"
    );
    report
}

fn tail_failure(result: Result<anyhow::Result<()>, Box<dyn Any + Send>>) -> Option<CapturedError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(normalize(Thrown::Error(err))),
        Err(payload) => Some(normalize(Thrown::Panic(payload))),
    }
}

/// Hands a still-pending cleanup tail off so the drain does not wait on it.
///
/// Uses the current tokio runtime when there is one; otherwise the tail is
/// sent to the shared helper runtime.
fn detach<F>(tail: F, ctx: DrainContext, name: Option<String>, position: usize)
where
    F: Future<Output = Result<anyhow::Result<()>, Box<dyn Any + Send>>> + Send + 'static,
{
    let task = async move {
        if let Some(error) = tail_failure(tail.await) {
            let diagnostic = ctx.diagnostic(CleanupFailureKind::Async, error, name, position);
            ctx.sink.emit(diagnostic).await;
        }
    };

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        debug!(position, "Detaching pending cleanup tail onto the tokio runtime");
        handle.spawn(task);
        return;
    }

    debug!(position, "Detaching pending cleanup tail onto the helper runtime");
    let sent = helper_tasks().map(|tasks| tasks.send(task.boxed()).is_ok());
    if sent != Some(true) {
        warn!(position, "Helper runtime unavailable, dropping pending cleanup tail");
    }
}

type HelperTask = BoxFuture<'static, ()>;

static HELPER_TASKS: OnceLock<Option<mpsc::UnboundedSender<HelperTask>>> = OnceLock::new();

/// Returns the queue of the process-wide helper runtime, starting it on
/// first use.
fn helper_tasks() -> Option<&'static mpsc::UnboundedSender<HelperTask>> {
    HELPER_TASKS.get_or_init(start_helper).as_ref()
}

/// Starts one `deferflow-cleanup` thread running a current-thread tokio
/// runtime that spawns every tail it receives.
fn start_helper() -> Option<mpsc::UnboundedSender<HelperTask>> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!(error = %err, "Failed to build cleanup helper runtime");
            return None;
        }
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<HelperTask>();

    let spawned = std::thread::Builder::new()
        .name(HELPER_THREAD_NAME.to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while let Some(task) = rx.recv().await {
                    tokio::spawn(task);
                }
            });
        });

    match spawned {
        Ok(_) => Some(tx),
        Err(err) => {
            warn!(error = %err, "Failed to start cleanup helper thread");
            None
        }
    }
}

const HELPER_THREAD_NAME: &str = "deferflow-cleanup";
