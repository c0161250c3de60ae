//! Error types for consensus validation.

use crate::LoopError;
use thiserror::Error;

/// Verdict of a failed validation, mirroring the two severities the host
/// consensus engine distinguishes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The transaction is malformed or violates a structural rule.
    #[error("invalid transaction: {0}")]
    Invalid(String),

    /// The transaction is well-formed but violates a consensus rule; the
    /// host surfaces the message and rejects the transaction.
    #[error("rule violation: {0}")]
    Rule(String),
}

impl ValidationError {
    /// Structural-failure verdict.
    pub fn invalid(msg: impl Into<String>) -> Self {
        ValidationError::Invalid(msg.into())
    }

    /// Rule-violation verdict.
    pub fn rule(msg: impl Into<String>) -> Self {
        ValidationError::Rule(msg.into())
    }

    /// The human-readable reason.
    pub fn message(&self) -> &str {
        match self {
            ValidationError::Invalid(msg) | ValidationError::Rule(msg) => msg,
        }
    }
}

impl From<LoopError> for ValidationError {
    fn from(err: LoopError) -> Self {
        ValidationError::Rule(err.to_string())
    }
}

/// Result type for validator calls.
pub type ValidationResult<T> = Result<T, ValidationError>;
