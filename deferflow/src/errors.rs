//! Error types and the error normalizer.
//!
//! Everything an action or a cleanup callback can fail with, whether an
//! `Err`, a panic, or an arbitrary value, is converted into a
//! [`CapturedError`] by [`normalize`] before the engine observes it.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Message prefix used when something other than an error was thrown.
pub const NON_ERROR_PREFIX: &str = "non-error value thrown";

/// Shared, type-erased cause of a [`CapturedError`].
pub type ErrorCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Where a captured error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    /// An `Err` value returned by the action or callback.
    Error,
    /// A panic unwound out of the action or callback.
    Panic,
    /// A non-error value was thrown.
    Value,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Panic => write!(f, "panic"),
            Self::Value => write!(f, "value"),
        }
    }
}

/// A normalized error: a message plus an optional underlying cause.
///
/// Cloning is cheap; clones share the same cause and compare equal.
#[derive(Debug, Clone)]
pub struct CapturedError {
    message: String,
    origin: ErrorOrigin,
    cause: Option<ErrorCause>,
}

impl CapturedError {
    /// Creates an error with a message and no cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: ErrorOrigin::Error,
            cause: None,
        }
    }

    /// Creates an error with a message and an underlying cause.
    #[must_use]
    pub fn with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            origin: ErrorOrigin::Error,
            cause: Some(Arc::new(cause)),
        }
    }

    /// Wraps this error under a new message, keeping it as the cause.
    #[must_use]
    pub fn context(self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: ErrorOrigin::Error,
            cause: Some(Arc::new(self)),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns where the error came from.
    #[must_use]
    pub fn origin(&self) -> ErrorOrigin {
        self.origin
    }

    /// Returns true if the error was produced by a panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.origin == ErrorOrigin::Panic
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Downcasts the underlying cause to a concrete error type.
    ///
    /// Errors normalized from an `anyhow::Error` are searched through their
    /// whole context chain.
    #[must_use]
    pub fn downcast_cause<E>(&self) -> Option<&E>
    where
        E: StdError + Send + Sync + 'static,
    {
        let cause = self.cause.as_deref()?;
        match cause.downcast_ref::<AnyhowCause>() {
            Some(wrapped) => wrapped.0.downcast_ref::<E>(),
            None => cause.downcast_ref::<E>(),
        }
    }

    /// Returns the messages of the cause chain, outermost first.
    #[must_use]
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        // A wrapped anyhow error already supplied the message.
        let mut current = match self.cause.as_deref() {
            Some(cause) => match cause.downcast_ref::<AnyhowCause>() {
                Some(wrapped) => wrapped.0.source(),
                None => Some(cause as &(dyn StdError + 'static)),
            },
            None => None,
        };
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "origin": self.origin,
            "causes": self.cause_chain(),
        })
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CapturedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl PartialEq for CapturedError {
    fn eq(&self, other: &Self) -> bool {
        let same_cause = match (&self.cause, &other.cause) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.message == other.message && self.origin == other.origin && same_cause
    }
}

/// Cause attached when a non-error value was thrown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("thrown value: {repr}")]
pub struct ThrownValue {
    /// Textual representation of the thrown value.
    pub repr: String,
}

/// Cause attached when a panic carried a textual payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("panic: {message}")]
pub struct PanicPayload {
    /// The panic message.
    pub message: String,
}

/// Errors raised while configuring the engine or its logging.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The log filter directive is invalid.
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter {
        /// The rejected filter.
        filter: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A global tracing subscriber is already installed.
    #[error("Tracing subscriber already installed: {0}")]
    Subscriber(String),
}

/// Anything an action or cleanup callback can fail with.
pub enum Thrown {
    /// An error value.
    Error(anyhow::Error),
    /// A panic payload caught while unwinding.
    Panic(Box<dyn Any + Send>),
    /// A plain value that is not an error.
    Value(serde_json::Value),
    /// A value that could not be represented; carries its type name.
    Opaque(&'static str),
}

impl Thrown {
    /// Captures an arbitrary serializable value as a thrown value.
    pub fn value<T>(value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_value(value)
            .map_or_else(|_| Self::Opaque(std::any::type_name::<T>()), Self::Value)
    }
}

impl fmt::Debug for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::Panic(_) => f.debug_tuple("Panic").field(&"..").finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Opaque(type_name) => f.debug_tuple("Opaque").field(type_name).finish(),
        }
    }
}

impl From<anyhow::Error> for Thrown {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(err)
    }
}

/// Converts anything thrown into a [`CapturedError`]. Never fails.
pub fn normalize(thrown: Thrown) -> CapturedError {
    match thrown {
        Thrown::Error(err) => normalize_error(err),
        Thrown::Panic(payload) => normalize_panic(payload),
        Thrown::Value(value) => normalize_value(&value),
        Thrown::Opaque(type_name) => {
            let repr = format!("<unserializable {type_name}>");
            CapturedError {
                message: format!("{NON_ERROR_PREFIX}: {repr}"),
                origin: ErrorOrigin::Value,
                cause: Some(Arc::new(ThrownValue { repr })),
            }
        }
    }
}

fn normalize_error(err: anyhow::Error) -> CapturedError {
    // Only the outermost error counts; an error wrapped in extra context
    // keeps that context.
    if let Some(captured) = err
        .chain()
        .next()
        .and_then(|outer| outer.downcast_ref::<CapturedError>())
    {
        return captured.clone();
    }

    CapturedError {
        message: err.to_string(),
        origin: ErrorOrigin::Error,
        cause: Some(Arc::new(AnyhowCause(err))),
    }
}

/// An `anyhow::Error` kept as a cause, so the original error stays
/// reachable through `downcast_cause` and `source()`.
struct AnyhowCause(anyhow::Error);

impl fmt::Debug for AnyhowCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for AnyhowCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for AnyhowCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

fn normalize_panic(payload: Box<dyn Any + Send>) -> CapturedError {
    let payload = match payload.downcast::<CapturedError>() {
        Ok(captured) => return *captured,
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<serde_json::Value>() {
        Ok(value) => return normalize_value(&value),
        Err(payload) => payload,
    };

    let message = payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());

    match message {
        Some(message) => CapturedError {
            message: message.clone(),
            origin: ErrorOrigin::Panic,
            cause: Some(Arc::new(PanicPayload { message })),
        },
        None => CapturedError {
            message: format!("{NON_ERROR_PREFIX}: <opaque panic payload>"),
            origin: ErrorOrigin::Panic,
            cause: None,
        },
    }
}

fn normalize_value(value: &serde_json::Value) -> CapturedError {
    let repr = serde_json::to_string(value).unwrap_or_else(|_| "<unserializable value>".to_string());
    CapturedError {
        message: format!("{NON_ERROR_PREFIX}: {repr}"),
        origin: ErrorOrigin::Value,
        cause: Some(Arc::new(ThrownValue { repr })),
    }
}

/// Extension for attaching context to captured failures.
pub trait ResultExt<T> {
    /// Wraps the error, if any, under `message`.
    fn or_context(self, message: impl Into<String>) -> Result<T, CapturedError>;
}

impl<T> ResultExt<T> for Result<T, CapturedError> {
    fn or_context(self, message: impl Into<String>) -> Result<T, CapturedError> {
        self.map_err(|err| err.context(message))
    }
}
