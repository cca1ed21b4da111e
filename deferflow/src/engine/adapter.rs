//! Result adapters: how a settled outcome is surfaced to the caller.

use super::outcome::{Captured, Outcome};
use crate::errors::CapturedError;

/// Shapes a settled [`Outcome`] once cleanup has run.
pub trait ResultAdapter<T> {
    /// What the caller receives.
    type Output;

    /// Produces the caller-visible result.
    fn adapt(self, outcome: Outcome<T>) -> Self::Output;
}

/// Returns the outcome as a two-slot [`Captured`]. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueReturn;

impl<T> ResultAdapter<T> for ValueReturn {
    type Output = Captured<T>;

    fn adapt(self, outcome: Outcome<T>) -> Captured<T> {
        Captured::from(outcome)
    }
}

/// Returns the value, or hands the error back as `Err`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reraise;

impl<T> ResultAdapter<T> for Reraise {
    type Output = Result<T, CapturedError>;

    fn adapt(self, outcome: Outcome<T>) -> Result<T, CapturedError> {
        outcome.into_result()
    }
}

/// Discards the value; on failure calls the handler once with the error.
pub struct Dispatch<H> {
    handler: H,
}

impl<H> Dispatch<H>
where
    H: FnOnce(CapturedError),
{
    /// Creates a dispatching adapter.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl<T, H> ResultAdapter<T> for Dispatch<H>
where
    H: FnOnce(CapturedError),
{
    type Output = ();

    fn adapt(self, outcome: Outcome<T>) {
        if let Outcome::Failure(error) = outcome {
            (self.handler)(error);
        }
    }
}

impl<H> std::fmt::Debug for Dispatch<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}
