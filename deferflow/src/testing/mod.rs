//! Testing utilities for code that uses deferred cleanup.
//!
//! This module provides:
//! - `CallLog` for asserting the order callbacks and actions ran in
//! - re-export of `CollectingDiagnosticSink` for observing cleanup failures

mod call_log;

pub use call_log::CallLog;
pub use crate::diagnostics::CollectingDiagnosticSink;
