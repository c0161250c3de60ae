//! # marmara-consensus
//!
//! Consensus rules for the Marmara credit-loop module.
//!
//! This crate provides:
//! - The opret codec: the typed metadata attached to every Marmara output
//! - The output classifier (activated vs locked-in-loop coins)
//! - Credit-loop traversal (creation tx, baton chain, endorser counting)
//! - The transaction validators dispatched by observed func-id set
//! - The stake-transaction acceptance predicate used by the PoS layer
//! - Fork-gated rule sets threaded through every validation call
//!
//! ## Credit loops
//!
//! A credit loop is a chain of endorsed, time-locked obligations: a receiver
//! creates the loop, an issuer locks the principal in, endorsers successively
//! take the obligation over (each transfer redistributes the prior endorsers'
//! shares back to them), and at maturity the pot is settled to the current
//! holder. Every step is an on-chain transaction; the validators here decide
//! which of those transactions the network accepts.

mod classifier;
mod error;
mod loops;
mod opret;
mod ruleset;
mod stake;
mod validate;

pub use classifier::{activated_pubkey, locked_in_loop_pubkey, vout_opret, OpretChecker, OpretKind};
pub use error::{ValidationError, ValidationResult};
pub use loops::{
    create_txid_of, latest_baton, loop_creation_data, loop_endorsers_of, settlement_spender_of,
    CreditLoop, LoopCreation, LoopError,
};
pub use opret::{ActivatedKind, FuncId, IssuerParams, MarmaraOpret, OpretCarrier, VersionCheck};
pub use ruleset::{RuleSet, ValidationContext};
pub use stake::{stake_multiplier, validate_stake_tx, StakeVerdict};
pub use validate::validate_tx;

/// Marmara consensus constants.
pub mod params {
    use marmara_chain::{Amount, Height, PubKey};

    /// Eval code identifying Marmara crypto-condition outputs and oprets.
    pub const MARMARA_EVAL: u8 = 0xef;

    /// Current opret version byte.
    pub const OPRET_VERSION: u8 = 1;

    /// Opret version reserved for the 12-month loop variant.
    pub const OPRET_LOOP12_VERSION: u8 = 2;

    /// Staking group size used by the PoS layer's slot selection.
    pub const GROUP_SIZE: u32 = 60;

    /// Rounding tolerance for loop share arithmetic, in base units.
    pub const LOOP_TOLERANCE: Amount = 100;

    /// Hard ceiling on transaction inputs imposed by the crypto-condition
    /// host; rule sets derive their vin limits from it.
    pub const CC_MAX_VINS: usize = 1024;

    /// Baton vout index on create/issue/transfer transactions.
    pub const BATON_VOUT: u32 = 0;

    /// Loop marker vout index on issue transactions.
    pub const LOOP_MARKER_VOUT: u32 = 1;

    /// Request vout index on create/request transactions.
    pub const REQUEST_VOUT: u32 = 0;

    /// Open/close marker vout index on issue transactions; spending it is
    /// what settles the loop.
    pub const OPENCLOSE_VOUT: u32 = 3;

    /// Settlement payout vout index.
    pub const SETTLE_VOUT: u32 = 0;

    /// Marker amount that makes activated addresses discoverable.
    pub const ACTIVATED_MARKER_AMOUNT: Amount = 5_000;

    /// Fixed baton vout value; a spent-chain entry with a different value is
    /// a "false baton".
    pub const BATON_AMOUNT: Amount = 10_000;

    /// Combined marker value carried by a create transaction.
    pub const CREATETX_AMOUNT: Amount = 2 * BATON_AMOUNT;

    /// Loop marker vout value.
    pub const LOOP_MARKER_AMOUNT: Amount = 10_000;

    /// Open/close marker vout value.
    pub const OPEN_MARKER_AMOUNT: Amount = 10_000;

    /// Sentinel unlock height meaning "locked until an even boosting height".
    pub const V2_LOCK_HEIGHT: Height = i32::MAX - 1;

    /// Currency tag carried by create transactions on this chain.
    pub const CURRENCY: &str = "MARMARA";

    /// Height of the first consensus update (March 2020).
    pub const POS_IMPROVEMENTS_HEIGHT: Height = 110_777;

    /// Activation timestamp of the second consensus update (June 2020).
    pub const JUNE_2020_UPDATE_TIMESTAMP: u32 = 1_593_007_200;

    /// The module's well-known 1-of-2 co-owner key.
    ///
    /// Its private half is intentionally public knowledge, so this key may
    /// never appear as a signer; it exists so consensus code can recognise
    /// Marmara outputs purely from their scripts.
    pub const MODULE_PUBKEY: PubKey = PubKey([
        0x03, 0x5d, 0x3b, 0x0f, 0x2e, 0x98, 0xcf, 0x0e, 0xe9, 0x0a, 0x7d, 0xf6, 0x4d, 0xc3, 0x1e,
        0xa7, 0x3c, 0x5c, 0x3a, 0xd2, 0x68, 0x8b, 0x5a, 0x18, 0xc3, 0x7e, 0xcd, 0x21, 0x30, 0x44,
        0x9a, 0xb4, 0x7f,
    ]);
}
