//! Errors during transaction construction.

use marmara_chain::{Amount, Height, TxId};
use marmara_consensus::LoopError;
use thiserror::Error;

/// Errors during transaction building.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxBuildError {
    /// Loop traversal failed.
    #[error("loop traversal failed: {0}")]
    Traversal(#[from] LoopError),

    /// The loop has been created but never issued.
    #[error("credit loop {0} is empty, nothing to settle")]
    EmptyLoop(TxId),

    /// Settlement requested before the loop matured.
    #[error("credit loop does not mature yet: matures at {matures}, height {height}")]
    NotMatured { matures: Height, height: Height },

    /// A settlement for this loop already exists in chain or mempool.
    #[error("credit loop already settled")]
    AlreadySettled,

    /// The latest baton tx carries no holder opret.
    #[error("baton tx {0} has no issue or transfer opreturn")]
    NoHolder(TxId),

    /// No unspent locked coins remain in the loop.
    #[error("no unspent locked coins in loop {0}")]
    EmptyPot(TxId),

    /// Not enough funds.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    /// Nonsensical amount requested.
    #[error("invalid amount: {0}")]
    InvalidAmount(Amount),
}

/// Result type for construction paths.
pub type TxBuildResult<T> = Result<T, TxBuildError>;
