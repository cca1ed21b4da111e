//! Error capture without a cleanup queue.

use std::future::Future;

use super::adapter::{Reraise, ResultAdapter, ValueReturn};
use super::executor::{call, outcome_of, settle};
use super::outcome::{Captured, Outcome};
use crate::errors::CapturedError;

fn attempt_with<T, E, F, R>(adapter: R, f: F) -> R::Output
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error>,
    R: ResultAdapter<T>,
{
    let outcome = match call(f) {
        Ok(result) => outcome_of(result.map_err(Into::into)),
        Err(error) => Outcome::Failure(error),
    };
    adapter.adapt(outcome)
}

/// Runs `f`, capturing its error or panic into a [`Captured`].
pub fn attempt<T, E, F>(f: F) -> Captured<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    attempt_with(ValueReturn, f)
}

/// Runs `f`, normalizing its error or panic into a [`CapturedError`].
pub fn attempt_propagating<T, E, F>(f: F) -> Result<T, CapturedError>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    attempt_with(Reraise, f)
}

/// Awaits `future`, capturing its error or panic into a [`Captured`].
pub async fn attempt_async<T, E, F>(future: F) -> Captured<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let outcome = settle(async move { future.await.map_err(Into::into) }).await;
    ValueReturn.adapt(outcome)
}
