//! Engine and logging configuration.

use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticLevel;
use crate::errors::ConfigError;

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Label attached to invocation spans and diagnostics.
    #[serde(default)]
    pub label: Option<String>,
    /// Level used when diagnostics fall back to the tracing sink.
    #[serde(default)]
    pub diagnostic_level: DiagnosticLevel,
    /// Whether to use the process-wide sink when none is injected.
    #[serde(default = "default_use_global_sink")]
    pub use_global_sink: bool,
}

fn default_use_global_sink() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: None,
            diagnostic_level: DiagnosticLevel::default(),
            use_global_sink: default_use_global_sink(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the fallback diagnostic level.
    #[must_use]
    pub fn with_diagnostic_level(mut self, level: DiagnosticLevel) -> Self {
        self.diagnostic_level = level;
        self
    }

    /// Sets whether the process-wide sink is consulted.
    #[must_use]
    pub fn with_global_sink(mut self, enabled: bool) -> Self {
        self.use_global_sink = enabled;
        self
    }
}

/// Configuration for [`init_tracing`](crate::observability::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info,deferflow=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a logging configuration with the given filter.
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            json: false,
        }
    }

    /// Switches to JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}
