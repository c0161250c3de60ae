//! Fork-gated consensus rule sets.
//!
//! Two rule generations coexist on chain. Which one applies to a transaction
//! is decided by the block height and the tip's median-time-past attached to
//! the validation context, never by the local clock, and the selected rules
//! travel through validation as a plain value rather than a global.

use crate::params::{CC_MAX_VINS, JUNE_2020_UPDATE_TIMESTAMP, POS_IMPROVEMENTS_HEIGHT};
use marmara_chain::{ChainView, Height};
use serde::{Deserialize, Serialize};

/// One generation of consensus rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Maximum inputs per validated transaction.
    pub max_vins: usize,
    /// Maximum endorsers a loop may accumulate.
    pub max_endorsers: usize,
    /// Default dispute-expiry offset for issuer terms, in blocks.
    pub dispute_expires_offset: Height,
    /// Whether escrow-backed issuance is available.
    pub escrow_allowed: bool,
    /// Whether settlement re-runs full issue validation on the referenced
    /// issue tx (and requires it to fail). The re-check predates the June
    /// 2020 update; afterwards the confirmed issue tx gets a shape check
    /// only.
    pub settlement_rechecks_issue: bool,
}

impl RuleSet {
    /// Rules in force before the June 2020 update.
    pub fn legacy() -> Self {
        Self {
            max_vins: CC_MAX_VINS / 2,
            max_endorsers: 64,
            dispute_expires_offset: 3 * 365 * 24 * 60,
            escrow_allowed: false,
            settlement_rechecks_issue: true,
        }
    }

    /// Rules in force from the June 2020 update onwards.
    pub fn current() -> Self {
        Self {
            max_vins: CC_MAX_VINS,
            max_endorsers: 1_000,
            dispute_expires_offset: 365 * 24 * 60,
            escrow_allowed: true,
            settlement_rechecks_issue: false,
        }
    }

    /// Select the rules in force at the given height and tip median-time.
    pub fn at(height: Height, latest_timestamp: u32) -> Self {
        if height >= POS_IMPROVEMENTS_HEIGHT && latest_timestamp >= JUNE_2020_UPDATE_TIMESTAMP {
            Self::current()
        } else {
            Self::legacy()
        }
    }
}

/// Everything a validator call needs besides the chain view: where we are on
/// the chain, whether this chain runs Marmara at all, and which rule
/// generation applies.
#[derive(Clone, Debug)]
pub struct ValidationContext {
    /// Height the transaction validates at.
    pub height: Height,
    /// Median-time-past of the tip.
    pub latest_timestamp: u32,
    /// The chain's immutable Marmara-enabled flag, fixed at bring-up.
    pub marmara_enabled: bool,
    /// Rules in force.
    pub rules: RuleSet,
}

impl ValidationContext {
    /// Context for the given chain position, selecting rules automatically.
    pub fn new(height: Height, latest_timestamp: u32, marmara_enabled: bool) -> Self {
        Self {
            height,
            latest_timestamp,
            marmara_enabled,
            rules: RuleSet::at(height, latest_timestamp),
        }
    }

    /// Context at the view's current tip.
    pub fn at_tip<V: ChainView + ?Sized>(view: &V, marmara_enabled: bool) -> Self {
        Self::new(view.current_height(), view.latest_timestamp(), marmara_enabled)
    }
}
