//! Deferred cleanup: the per-invocation queue and the runner that drains it.
//!
//! This module provides:
//! - `DeferHandle` for registering cleanup callbacks in FIFO order
//! - the drain loop that runs them once each, isolating failures

mod queue;
mod runner;

pub use queue::{CleanupFuture, DeferHandle, IntoCleanupResult};
pub use runner::DrainReport;

pub(crate) use runner::{drain, DrainContext};
