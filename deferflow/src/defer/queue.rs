//! Per-invocation cleanup queue and its registration handle.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Future returned by an asynchronous cleanup callback once boxed.
pub type CleanupFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Return types accepted from cleanup callbacks.
pub trait IntoCleanupResult {
    /// Converts the callback's return value into success or failure.
    fn into_cleanup_result(self) -> anyhow::Result<()>;
}

impl IntoCleanupResult for () {
    fn into_cleanup_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoCleanupResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_cleanup_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// A queued cleanup callback.
pub(crate) enum Callback {
    /// Runs to completion when invoked.
    Immediate(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    /// Returns a future whose tail may outlive the drain.
    Pending(Box<dyn FnOnce() -> CleanupFuture + Send>),
}

/// A callback plus the name it was registered under.
pub(crate) struct CleanupEntry {
    pub(crate) name: Option<String>,
    pub(crate) callback: Callback,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<CleanupEntry>,
    drained: bool,
}

/// Append-only FIFO of cleanup callbacks, drained exactly once.
#[derive(Default)]
pub(crate) struct DeferQueue {
    state: Mutex<QueueState>,
}

impl DeferQueue {
    fn push(&self, entry: CleanupEntry) -> bool {
        let mut state = self.state.lock();
        if state.drained {
            return false;
        }
        state.entries.push_back(entry);
        true
    }

    /// Takes every queued entry and closes the queue.
    ///
    /// Returns `None` if the queue was already drained.
    pub(crate) fn take_for_drain(&self) -> Option<VecDeque<CleanupEntry>> {
        let mut state = self.state.lock();
        if state.drained {
            return None;
        }
        state.drained = true;
        Some(std::mem::take(&mut state.entries))
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn is_drained(&self) -> bool {
        self.state.lock().drained
    }
}

/// Handle an action uses to register cleanup callbacks.
///
/// Each engine invocation creates a fresh queue; clones of the handle share
/// it. Callbacks run in registration order once the action settles.
/// Registering after that point is ignored and the `defer*` call returns
/// `false`.
#[derive(Clone, Default)]
pub struct DeferHandle {
    queue: Arc<DeferQueue>,
}

impl DeferHandle {
    /// Creates a handle bound to a new, empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous cleanup callback.
    ///
    /// The callback may return `()` or `Result<(), E>`.
    pub fn defer<F, R>(&self, callback: F) -> bool
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoCleanupResult,
    {
        self.push(None, immediate(callback))
    }

    /// Registers a named synchronous cleanup callback.
    pub fn defer_named<F, R>(&self, name: impl Into<String>, callback: F) -> bool
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoCleanupResult,
    {
        self.push(Some(name.into()), immediate(callback))
    }

    /// Registers an asynchronous cleanup callback.
    ///
    /// The closure and the first poll of its future run in order during the
    /// drain; whatever remains pending afterwards is detached.
    pub fn defer_async<F, Fut>(&self, callback: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoCleanupResult,
    {
        self.push(None, pending(callback))
    }

    /// Registers a named asynchronous cleanup callback.
    pub fn defer_async_named<F, Fut>(&self, name: impl Into<String>, callback: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoCleanupResult,
    {
        self.push(Some(name.into()), pending(callback))
    }

    /// Returns the number of callbacks waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Returns true once the queue has been drained.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.queue.is_drained()
    }

    pub(crate) fn queue(&self) -> &DeferQueue {
        &self.queue
    }

    fn push(&self, name: Option<String>, callback: Callback) -> bool {
        let accepted = self.queue.push(CleanupEntry {
            name: name.clone(),
            callback,
        });
        if !accepted {
            warn!(
                callback = name.as_deref().unwrap_or("<unnamed>"),
                "Ignoring cleanup callback registered after the queue was drained"
            );
        }
        accepted
    }
}

impl std::fmt::Debug for DeferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferHandle")
            .field("pending_count", &self.pending_count())
            .field("drained", &self.is_drained())
            .finish()
    }
}

fn immediate<F, R>(callback: F) -> Callback
where
    F: FnOnce() -> R + Send + 'static,
    R: IntoCleanupResult,
{
    Callback::Immediate(Box::new(move || callback().into_cleanup_result()))
}

fn pending<F, Fut>(callback: F) -> Callback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoCleanupResult,
{
    Callback::Pending(Box::new(move || {
        let future = callback();
        async move { future.await.into_cleanup_result() }.boxed()
    }))
}
