//! # marmara-wallet
//!
//! Construction paths for the Marmara credit-loop module.
//!
//! This crate provides:
//! - The settlement driver: assembles the full or partial settlement tx for
//!   a matured credit loop
//! - The activated-coin lock builder
//! - A read-only credit-loop query helper for wallet and RPC surfaces
//!
//! Unlike the validators, construction code may consult the mempool (to
//! avoid racing an already-submitted settlement) and is free to pick input
//! sets; everything it emits must still pass consensus validation.

mod error;
mod lock;
mod query;
mod settlement;

pub use error::{TxBuildError, TxBuildResult};
pub use lock::build_lock;
pub use query::{query_credit_loop, LoopEndorser, LoopInfo, LoopStatus};
pub use settlement::build_settlement;
