//! Diagnostic records for failures that are swallowed instead of propagated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Expected noise (e.g. a dropped keepalive frame).
    Debug,
    /// Degraded but recovering.
    Warn,
    /// A failure that was contained.
    Error,
}

/// A contained failure, published on a diagnostics channel so callers and
/// tests can observe it without scraping logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub level: DiagnosticLevel,
    /// Component that swallowed the failure, e.g. `transport.frame`.
    pub source: String,
    /// Human-readable description.
    pub message: String,
    /// When it happened.
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    /// Create a diagnostic stamped with the current time.
    pub fn new(level: DiagnosticLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Shorthand for a warning.
    pub fn warn(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warn, source, message)
    }

    /// Shorthand for an error.
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, source, message)
    }
}
