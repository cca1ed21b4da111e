//! Settled action outcomes and the two-slot captured result.

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::errors::CapturedError;

/// The settled result of running an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The action produced a value.
    Success(T),
    /// The action failed; the error is already normalized.
    Failure(CapturedError),
}

impl<T> Outcome<T> {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for `Failure`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> Result<T, CapturedError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, CapturedError>> for Outcome<T> {
    fn from(result: Result<T, CapturedError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Value-return result: exactly one of `value` and `error` is present.
///
/// Serializes as `{"value": ..., "error": null}` or
/// `{"value": null, "error": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured<T> {
    inner: Result<T, CapturedError>,
}

impl<T> Captured<T> {
    /// Creates a successful result.
    #[must_use]
    pub fn success(value: T) -> Self {
        Self { inner: Ok(value) }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error: CapturedError) -> Self {
        Self { inner: Err(error) }
    }

    /// Returns the value slot.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.inner.as_ref().ok()
    }

    /// Returns the error slot.
    #[must_use]
    pub fn error(&self) -> Option<&CapturedError> {
        self.inner.as_ref().err()
    }

    /// Returns true if the value slot is populated.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }

    /// Returns true if the error slot is populated.
    #[must_use]
    pub fn is_err(&self) -> bool {
        self.inner.is_err()
    }

    /// Splits into `(value, error)`.
    pub fn into_parts(self) -> (Option<T>, Option<CapturedError>) {
        match self.inner {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        }
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> Result<T, CapturedError> {
        self.inner
    }
}

impl<T> From<Outcome<T>> for Captured<T> {
    fn from(outcome: Outcome<T>) -> Self {
        Self {
            inner: outcome.into_result(),
        }
    }
}

impl<T: Serialize> Serialize for Captured<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Captured", 2)?;
        state.serialize_field("value", &self.value())?;
        state.serialize_field("error", &self.error().map(CapturedError::to_value))?;
        state.end()
    }
}
