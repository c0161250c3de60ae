//! Error types for chain primitives.

use thiserror::Error;

/// Errors from parsing or constructing chain primitives.
#[derive(Error, Debug)]
pub enum ChainError {
    /// A byte slice had the wrong length for the target identifier.
    #[error("invalid {kind} length: expected {expected} bytes, got {got}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Result type for chain primitive operations.
pub type ChainResult<T> = Result<T, ChainError>;
