//! # Deferflow
//!
//! Scoped deferred cleanup for synchronous and asynchronous actions.
//!
//! An action receives a [`DeferHandle`] and registers cleanup callbacks on
//! it. Once the action settles, successfully or not, the callbacks run in
//! registration order. Failures in cleanup never change the action's
//! outcome; they are reported to a diagnostic sink instead.
//!
//! Deferflow provides:
//!
//! - **Three result styles**: a two-slot [`Captured`], a propagated
//!   `Result`, or an error handler callback
//! - **Sync and async actions** through one engine, decided by what the
//!   action returns
//! - **Error normalization**: errors, panics and thrown values all become a
//!   [`CapturedError`]
//! - **Diagnostics** routed to an injected, process-wide, or tracing sink
//!
//! ## Quick Start
//!
//! ```rust
//! use deferflow::prelude::*;
//!
//! let result = run_propagating_sync(|defer| {
//!     defer.defer(|| println!("closing"));
//!     "42".parse::<u32>()
//! });
//! assert_eq!(result, Ok(42));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod defer;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod testing;

pub use config::{EngineConfig, LoggingConfig};
pub use defer::DeferHandle;
pub use engine::{
    run_capturing, run_capturing_sync, run_handled, run_handled_sync, run_propagating,
    run_propagating_sync, Captured, Completion, Engine, Outcome, Settlement,
};
pub use errors::{CapturedError, ErrorOrigin};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, LoggingConfig};
    pub use crate::defer::{DeferHandle, DrainReport, IntoCleanupResult};
    pub use crate::diagnostics::{
        clear_diagnostic_sink, set_diagnostic_sink, CleanupDiagnostic, CleanupFailureKind,
        CollectingDiagnosticSink, DiagnosticLevel, DiagnosticSink, NoOpDiagnosticSink,
        TracingDiagnosticSink,
    };
    pub use crate::engine::{
        attempt, attempt_async, attempt_propagating, run_capturing, run_capturing_sync,
        run_handled, run_handled_sync, run_propagating, run_propagating_sync, Captured,
        Completion, Dispatch, Engine, IntoSettlement, Outcome, Reraise, ResultAdapter,
        Settlement, ValueReturn,
    };
    pub use crate::errors::{normalize, CapturedError, ErrorOrigin, ResultExt, Thrown};
    pub use crate::observability::init_tracing;
}
