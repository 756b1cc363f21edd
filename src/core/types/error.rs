//! Custom error types for the scanning core

use std::fmt;
use thiserror::Error;

/// Main error type for scan, session and pointer operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Invalid memory address: {0}")]
    InvalidAddress(String),

    #[error("Address {address} is unreadable: {reason}")]
    UnreadableAddress { address: String, reason: String },

    #[error("Failed to write memory at {address}: {reason}")]
    WriteFailed { address: String, reason: String },

    #[error("Invalid value type: {0}")]
    InvalidValueType(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid scan criterion: {0}")]
    InvalidCriterion(String),

    #[error("Invalid pattern format: {0}")]
    InvalidPattern(String),

    #[error("Scan session not found: {0}")]
    SessionNotFound(String),

    #[error("Scan session is closed: {0}")]
    SessionClosed(String),

    #[error("Scan session has no candidates: {0}")]
    EmptySession(String),

    #[error("A scan round is already running for session {0}")]
    ScanInProgress(String),

    #[error("Session limit reached ({0} sessions)")]
    SessionLimitReached(usize),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Pointer chain has {depth} levels, maximum is {max}")]
    ChainTooLong { depth: usize, max: usize },

    #[error("Pointer search needs up to {estimated} reads, budget is {budget}")]
    SearchBudgetExceeded { estimated: u64, budget: u64 },

    #[error("Pointer search recorded more than {limit} path steps")]
    TooManyPaths { limit: usize },

    #[error("Region enumeration incomplete: {0}")]
    RegionEnumerationPartial(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Scan timed out after {0} ms")]
    Timeout(u64),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Windows API error: {0}")]
    WindowsApi(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Result type alias for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

impl MemoryError {
    /// Creates an unreadable address error
    pub fn unreadable(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::UnreadableAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a write failed error
    pub fn write_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::WriteFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid criterion error
    pub fn invalid_criterion(reason: impl Into<String>) -> Self {
        MemoryError::InvalidCriterion(reason.into())
    }

    /// Creates a type mismatch error
    pub fn type_mismatch(reason: impl Into<String>) -> Self {
        MemoryError::TypeMismatch(reason.into())
    }

    /// Returns true for the two ways a round can be abandoned
    pub fn is_abandoned(&self) -> bool {
        matches!(self, MemoryError::Cancelled | MemoryError::Timeout(_))
    }
}
