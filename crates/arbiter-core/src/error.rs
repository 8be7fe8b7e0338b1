//! Shared error type across arbiter crates.

use thiserror::Error;

/// Caller-facing fault codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// Configuration could not be parsed or failed validation.
    InvalidConfig,
    /// Policy pack could not be built.
    InvalidPolicy,
    /// Unsupported config / rule file version.
    UnsupportedVersion,
    /// Payload exceeds a configured size limit.
    PayloadTooLarge,
    /// Producer name is not registered.
    UnknownProducer,
    /// Ledger integrity check failed; appends are refused.
    LedgerCorrupted,
    /// Ledger storage failed.
    LedgerIo,
    /// Internal error.
    Internal,
}

impl FaultCode {
    /// String representation used in logs and health output.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::InvalidConfig => "INVALID_CONFIG",
            FaultCode::InvalidPolicy => "INVALID_POLICY",
            FaultCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            FaultCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            FaultCode::UnknownProducer => "UNKNOWN_PRODUCER",
            FaultCode::LedgerCorrupted => "LEDGER_CORRUPTED",
            FaultCode::LedgerIo => "LEDGER_IO",
            FaultCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ArbiterError>;

/// Unified error type used by core and engine.
///
/// Policy vetoes and producer failures are *outcomes*, not errors; they never
/// surface here. What does surface is configuration trouble and ledger faults.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("payload too large: {size} bytes > {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("unknown producer: {0}")]
    UnknownProducer(String),
    #[error("ledger corrupted at index {index}: {reason}")]
    LedgerCorrupted { index: u64, reason: String },
    #[error("ledger io: {0}")]
    LedgerIo(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ArbiterError {
    /// Map internal error to a stable fault code.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            ArbiterError::InvalidConfig(_) => FaultCode::InvalidConfig,
            ArbiterError::InvalidPolicy(_) => FaultCode::InvalidPolicy,
            ArbiterError::UnsupportedVersion => FaultCode::UnsupportedVersion,
            ArbiterError::PayloadTooLarge { .. } => FaultCode::PayloadTooLarge,
            ArbiterError::UnknownProducer(_) => FaultCode::UnknownProducer,
            ArbiterError::LedgerCorrupted { .. } => FaultCode::LedgerCorrupted,
            ArbiterError::LedgerIo(_) => FaultCode::LedgerIo,
            ArbiterError::Internal(_) => FaultCode::Internal,
        }
    }

    /// True for faults that come from the audit ledger.
    pub fn is_ledger_fault(&self) -> bool {
        matches!(
            self,
            ArbiterError::LedgerCorrupted { .. } | ArbiterError::LedgerIo(_)
        )
    }
}

impl From<std::io::Error> for ArbiterError {
    fn from(e: std::io::Error) -> Self {
        ArbiterError::LedgerIo(e.to_string())
    }
}
