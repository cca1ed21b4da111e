//! Diagnostic records for failed cleanup callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CapturedError;

/// Prefix for a cleanup callback that failed while it ran synchronously.
pub const SYNC_CLEANUP_PREFIX: &str = "deferred cleanup callback failed";

/// Prefix for a cleanup callback whose pending tail failed.
pub const ASYNC_CLEANUP_PREFIX: &str = "deferred async cleanup callback failed";

/// How a cleanup callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupFailureKind {
    /// The callback returned an error or panicked while it was invoked.
    Sync,
    /// The future returned by the callback failed.
    Async,
}

impl CleanupFailureKind {
    /// Returns the fixed message prefix for this kind.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sync => SYNC_CLEANUP_PREFIX,
            Self::Async => ASYNC_CLEANUP_PREFIX,
        }
    }

    /// Returns the event type name for this kind.
    #[must_use]
    pub fn event_type(self) -> &'static str {
        match self {
            Self::Sync => "cleanup.failed",
            Self::Async => "cleanup.async_failed",
        }
    }
}

impl std::fmt::Display for CleanupFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// A non-fatal report about one failed cleanup callback.
#[derive(Debug, Clone)]
pub struct CleanupDiagnostic {
    /// Whether the failure was synchronous or in a pending tail.
    pub kind: CleanupFailureKind,
    /// The normalized failure.
    pub error: CapturedError,
    /// Name given at registration, if any.
    pub callback: Option<String>,
    /// Zero-based registration position in the queue.
    pub position: usize,
    /// The invocation that owned the callback.
    pub invocation_id: Option<Uuid>,
    /// The engine label, if configured.
    pub label: Option<String>,
    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}

impl CleanupDiagnostic {
    /// Creates a diagnostic for a failure.
    #[must_use]
    pub fn new(kind: CleanupFailureKind, error: CapturedError) -> Self {
        Self {
            kind,
            error,
            callback: None,
            position: 0,
            invocation_id: None,
            label: None,
            occurred_at: Utc::now(),
        }
    }

    /// Sets the callback name.
    #[must_use]
    pub fn with_callback(mut self, name: Option<String>) -> Self {
        self.callback = name;
        self
    }

    /// Sets the queue position.
    #[must_use]
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Sets the owning invocation and engine label.
    #[must_use]
    pub fn with_invocation(mut self, invocation_id: Uuid, label: Option<String>) -> Self {
        self.invocation_id = Some(invocation_id);
        self.label = label;
        self
    }

    /// Returns the fixed message prefix.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        self.kind.prefix()
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Returns `"<prefix>: <error>"`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}: {}", self.prefix(), self.error)
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "event_type": self.event_type(),
            "kind": self.kind,
            "message": self.summary(),
            "callback": self.callback,
            "position": self.position,
            "invocation_id": self.invocation_id,
            "label": self.label,
            "error": self.error.to_value(),
            "occurred_at": self.occurred_at.to_rfc3339(),
        })
    }
}
