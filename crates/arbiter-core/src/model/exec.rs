//! Producer boundary errors and bounded-execution outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal status of a bounded execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    Success,
    Timeout,
    Error,
    Cancelled,
}

impl ExecStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecStatus::Success => "SUCCESS",
            ExecStatus::Timeout => "TIMEOUT",
            ExecStatus::Error => "ERROR",
            ExecStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Classified failure reason of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecErrorCode {
    Transient,
    Network,
    MalformedInput,
    Permanent,
    Timeout,
    PayloadTooLarge,
    Panicked,
    Cancelled,
}

impl ExecErrorCode {
    /// Transient faults and deadline misses are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ExecErrorCode::Transient | ExecErrorCode::Network | ExecErrorCode::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecErrorCode::Transient => "TRANSIENT",
            ExecErrorCode::Network => "NETWORK",
            ExecErrorCode::MalformedInput => "MALFORMED_INPUT",
            ExecErrorCode::Permanent => "PERMANENT",
            ExecErrorCode::Timeout => "TIMEOUT",
            ExecErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ExecErrorCode::Panicked => "PANICKED",
            ExecErrorCode::Cancelled => "CANCELLED",
        }
    }
}

/// Failure kinds a producer may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerErrorKind {
    /// Temporary fault (overload, rate limit); retryable.
    Transient,
    /// Connectivity fault; retryable.
    Network,
    /// The request itself is unusable; terminal.
    MalformedInput,
    /// Any other permanent fault; terminal.
    Permanent,
}

impl ProducerErrorKind {
    pub fn code(self) -> ExecErrorCode {
        match self {
            ProducerErrorKind::Transient => ExecErrorCode::Transient,
            ProducerErrorKind::Network => ExecErrorCode::Network,
            ProducerErrorKind::MalformedInput => ExecErrorCode::MalformedInput,
            ProducerErrorKind::Permanent => ExecErrorCode::Permanent,
        }
    }
}

/// Error raised by a producer.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct ProducerError {
    pub kind: ProducerErrorKind,
    pub message: String,
}

impl ProducerError {
    pub fn new(kind: ProducerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::Transient, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::MalformedInput, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ProducerErrorKind::Permanent, message)
    }
}

/// Outcome of one bounded execution (the last attempt after retries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub status: ExecStatus,
    pub output: Option<String>,
    pub error_code: Option<ExecErrorCode>,
    /// Duration of the last attempt.
    pub duration_ms: u64,
    /// Attempts made, including the last one.
    pub attempts: u32,
    pub retryable: bool,
}

impl ExecResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }

    /// Output text, only when the execution succeeded.
    pub fn success_output(&self) -> Option<&str> {
        match self.status {
            ExecStatus::Success => self.output.as_deref(),
            _ => None,
        }
    }
}
