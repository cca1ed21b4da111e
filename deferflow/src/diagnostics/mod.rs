//! Diagnostics for failed cleanup callbacks.
//!
//! Cleanup failures never reach the caller of an engine. They are reported
//! to a [`DiagnosticSink`] instead: the one injected into the engine, or the
//! process-wide sink installed with [`set_diagnostic_sink`], or a
//! [`TracingDiagnosticSink`] when neither is set.

mod diagnostic;
mod sink;

pub use diagnostic::{
    CleanupDiagnostic, CleanupFailureKind, ASYNC_CLEANUP_PREFIX, SYNC_CLEANUP_PREFIX,
};
pub use sink::{
    CollectingDiagnosticSink, DiagnosticLevel, DiagnosticSink, NoOpDiagnosticSink,
    TracingDiagnosticSink,
};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_DIAGNOSTIC_SINK: RwLock<Option<Arc<dyn DiagnosticSink>>> = RwLock::new(None);

/// Installs the process-wide diagnostic sink.
pub fn set_diagnostic_sink(sink: Arc<dyn DiagnosticSink>) {
    *GLOBAL_DIAGNOSTIC_SINK.write() = Some(sink);
}

/// Removes the process-wide diagnostic sink.
pub fn clear_diagnostic_sink() {
    *GLOBAL_DIAGNOSTIC_SINK.write() = None;
}

/// Returns the process-wide diagnostic sink, if one is installed.
pub fn global_diagnostic_sink() -> Option<Arc<dyn DiagnosticSink>> {
    GLOBAL_DIAGNOSTIC_SINK.read().clone()
}

/// Returns the process-wide sink, falling back to a warn-level
/// [`TracingDiagnosticSink`].
pub fn diagnostic_sink() -> Arc<dyn DiagnosticSink> {
    global_diagnostic_sink().unwrap_or_else(|| Arc::new(TracingDiagnosticSink::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CapturedError;

    // Only test that touches the process-wide sink.
    #[test]
    fn test_global_sink_lifecycle() {
        clear_diagnostic_sink();
        assert!(global_diagnostic_sink().is_none());
        diagnostic_sink().try_emit(CleanupDiagnostic::new(
            CleanupFailureKind::Sync,
            CapturedError::new("fallback"),
        ));

        let collecting = Arc::new(CollectingDiagnosticSink::new());
        set_diagnostic_sink(collecting.clone());
        diagnostic_sink().try_emit(CleanupDiagnostic::new(
            CleanupFailureKind::Sync,
            CapturedError::new("routed"),
        ));
        assert_eq!(collecting.messages(), vec!["routed"]);

        clear_diagnostic_sink();
        assert!(global_diagnostic_sink().is_none());
    }
}
