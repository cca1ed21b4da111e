//! Diagnostic sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::{CleanupDiagnostic, CleanupFailureKind};

/// Trait for sinks that receive cleanup failure diagnostics.
///
/// Sinks must never fail or panic back into the engine.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    /// Emits a diagnostic from an async context.
    async fn emit(&self, diagnostic: CleanupDiagnostic);

    /// Emits a diagnostic without blocking.
    fn try_emit(&self, diagnostic: CleanupDiagnostic);
}

/// A sink that discards every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDiagnosticSink;

#[async_trait]
impl DiagnosticSink for NoOpDiagnosticSink {
    async fn emit(&self, _diagnostic: CleanupDiagnostic) {}

    fn try_emit(&self, _diagnostic: CleanupDiagnostic) {}
}

/// Log level used by [`TracingDiagnosticSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// `error` level.
    Error,
    /// `warn` level.
    #[default]
    Warn,
    /// `info` level.
    Info,
    /// `debug` level.
    Debug,
}

/// A sink that writes diagnostics through `tracing` on the
/// `deferflow::cleanup` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnosticSink {
    level: DiagnosticLevel,
}

impl TracingDiagnosticSink {
    /// Creates a sink that logs at `level`.
    #[must_use]
    pub fn new(level: DiagnosticLevel) -> Self {
        Self { level }
    }

    /// Returns the configured level.
    #[must_use]
    pub fn level(&self) -> DiagnosticLevel {
        self.level
    }

    fn log(&self, diagnostic: &CleanupDiagnostic) {
        let summary = diagnostic.summary();
        let callback = diagnostic.callback.as_deref().unwrap_or("<unnamed>");
        match self.level {
            DiagnosticLevel::Error => error!(
                target: "deferflow::cleanup",
                kind = %diagnostic.kind,
                callback,
                position = diagnostic.position,
                invocation_id = ?diagnostic.invocation_id,
                "{summary}"
            ),
            DiagnosticLevel::Warn => warn!(
                target: "deferflow::cleanup",
                kind = %diagnostic.kind,
                callback,
                position = diagnostic.position,
                invocation_id = ?diagnostic.invocation_id,
                "{summary}"
            ),
            DiagnosticLevel::Info => info!(
                target: "deferflow::cleanup",
                kind = %diagnostic.kind,
                callback,
                position = diagnostic.position,
                invocation_id = ?diagnostic.invocation_id,
                "{summary}"
            ),
            DiagnosticLevel::Debug => debug!(
                target: "deferflow::cleanup",
                kind = %diagnostic.kind,
                callback,
                position = diagnostic.position,
                invocation_id = ?diagnostic.invocation_id,
                "{summary}"
            ),
        }
    }
}

#[async_trait]
impl DiagnosticSink for TracingDiagnosticSink {
    async fn emit(&self, diagnostic: CleanupDiagnostic) {
        self.log(&diagnostic);
    }

    fn try_emit(&self, diagnostic: CleanupDiagnostic) {
        self.log(&diagnostic);
    }
}

/// A sink that keeps every diagnostic in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingDiagnosticSink {
    diagnostics: RwLock<Vec<CleanupDiagnostic>>,
    notify: Notify,
}

impl CollectingDiagnosticSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<CleanupDiagnostic> {
        self.diagnostics.read().clone()
    }

    /// Returns the number of collected diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.read().is_empty()
    }

    /// Returns diagnostics of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: CleanupFailureKind) -> Vec<CleanupDiagnostic> {
        self.diagnostics
            .read()
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the error messages in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics
            .read()
            .iter()
            .map(|d| d.error.message().to_string())
            .collect()
    }

    /// Clears all collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.write().clear();
    }

    /// Waits until at least `count` diagnostics arrived or `timeout` passed.
    ///
    /// Returns true if the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len() >= count;
            }
        }
    }

    fn push(&self, diagnostic: CleanupDiagnostic) {
        self.diagnostics.write().push(diagnostic);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl DiagnosticSink for CollectingDiagnosticSink {
    async fn emit(&self, diagnostic: CleanupDiagnostic) {
        self.push(diagnostic);
    }

    fn try_emit(&self, diagnostic: CleanupDiagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CapturedError;
    use std::sync::Arc;

    fn diagnostic(kind: CleanupFailureKind, message: &str) -> CleanupDiagnostic {
        CleanupDiagnostic::new(kind, CapturedError::new(message))
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpDiagnosticSink;
        sink.emit(diagnostic(CleanupFailureKind::Async, "x")).await;
        sink.try_emit(diagnostic(CleanupFailureKind::Sync, "y"));
    }

    #[tokio::test]
    async fn test_tracing_sink_all_levels() {
        for level in [
            DiagnosticLevel::Error,
            DiagnosticLevel::Warn,
            DiagnosticLevel::Info,
            DiagnosticLevel::Debug,
        ] {
            let sink = TracingDiagnosticSink::new(level);
            assert_eq!(sink.level(), level);
            sink.emit(diagnostic(CleanupFailureKind::Async, "late")).await;
            sink.try_emit(diagnostic(CleanupFailureKind::Sync, "early"));
        }
    }

    #[test]
    fn test_default_level_is_warn() {
        assert_eq!(TracingDiagnosticSink::default().level(), DiagnosticLevel::Warn);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingDiagnosticSink::new();
        assert!(sink.is_empty());

        sink.try_emit(diagnostic(CleanupFailureKind::Sync, "first"));
        sink.emit(diagnostic(CleanupFailureKind::Async, "second")).await;

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.messages(), vec!["first", "second"]);
        assert_eq!(sink.of_kind(CleanupFailureKind::Async).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_emit() {
        let sink = Arc::new(CollectingDiagnosticSink::new());

        let emitter = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter.emit(diagnostic(CleanupFailureKind::Async, "tail")).await;
        });

        assert!(sink.wait_for(1, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let sink = CollectingDiagnosticSink::new();
        assert!(!sink.wait_for(1, Duration::from_millis(20)).await);
    }
}
