//! Structured error types shared across the sweep crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SweepError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, channels, exit statuses, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the operator resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the sweep orchestrator.
///
/// Every family except [`SweepError::RecordParse`] is fatal to the running
/// sweep. Parse failures are recovered where they occur and only surface in
/// logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SweepError {
    /// Invalid configuration or setup (channel range, program paths, jammer mapping).
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// A build, upload, reset or jam command exited unsuccessfully.
    #[error("device operation error: {0}")]
    DeviceOperation(ErrorInfo),
    /// No terminal record arrived within the watchdog window.
    #[error("protocol timeout: {0}")]
    ProtocolTimeout(ErrorInfo),
    /// A decoded record violates the serial protocol (e.g. a summary without a sent count).
    #[error("protocol error: {0}")]
    Protocol(ErrorInfo),
    /// A serial line could not be decoded as a record.
    #[error("record parse error: {0}")]
    RecordParse(ErrorInfo),
    /// A serial connection could not be opened or read.
    #[error("serial link error: {0}")]
    Link(ErrorInfo),
    /// Snapshot, artifact or report persistence failed.
    #[error("persistence error: {0}")]
    Persistence(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl SweepError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SweepError::Configuration(info)
            | SweepError::DeviceOperation(info)
            | SweepError::ProtocolTimeout(info)
            | SweepError::Protocol(info)
            | SweepError::RecordParse(info)
            | SweepError::Link(info)
            | SweepError::Persistence(info) => info,
        }
    }

    /// Shorthand for a configuration error with the given code and message.
    pub fn configuration(code: impl Into<String>, message: impl Into<String>) -> Self {
        SweepError::Configuration(ErrorInfo::new(code, message))
    }

    /// Shorthand for a persistence error wrapping an I/O or serde failure.
    pub fn persistence(code: impl Into<String>, err: impl ToString) -> Self {
        SweepError::Persistence(ErrorInfo::new(code, err.to_string()))
    }

    /// Returns true when the error aborts a sweep.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SweepError::RecordParse(_))
    }
}
