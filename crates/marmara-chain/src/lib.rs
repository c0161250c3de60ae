//! # marmara-chain
//!
//! Chain primitives consumed by the Marmara credit-loop module.
//!
//! This crate provides:
//! - Identifier newtypes (`TxId`, `BlockHash`, `PubKey`) and the `Amount` alias
//! - The structural transaction model (`Transaction`, `TxIn`, `TxOut`)
//! - Script templates: pay-to-pubkey, crypto-condition vouts with an optional
//!   embedded data blob, and trailing OP_RETURN carriers
//! - The read-only ledger traits (`ChainView`, `MempoolView`) through which
//!   consensus code reaches the host node's UTXO state
//!
//! The underlying ledger, signature checking and the crypto-condition
//! interpreter live in the host daemon; consensus code here only compares
//! script *structure*, which is enough to recognise every Marmara output
//! class.

mod error;
mod script;
mod transaction;
mod types;
mod view;

pub use error::{ChainError, ChainResult};
pub use script::{cc_1of2_address, ScriptPubKey, ScriptSig};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};
pub use types::{Amount, BlockHash, Height, PubKey, TxId};
pub use view::{total_normal_inputs_of, ChainView, MempoolView, SpentInfo};
