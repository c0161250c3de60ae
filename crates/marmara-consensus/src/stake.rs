//! The stake-transaction acceptance predicate.
//!
//! A PoS block's stake tx spends a staking UTXO (activated or locked-in-loop
//! coins) back to the very same address. The predicate re-derives that
//! address from the stake tx's own cc opret and insists the opret is
//! byte-identical to the staked UTXO's, so a staker cannot smuggle different
//! terms into the chain while staking.

use crate::classifier::{vout_opret, OpretChecker};
use crate::params::{MARMARA_EVAL, MODULE_PUBKEY};
use crate::{ActivatedKind, MarmaraOpret};
use marmara_chain::{cc_1of2_address, Height, PubKey, Transaction};
use tracing::{debug, info};

/// Verdict of the stake predicate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StakeVerdict {
    /// A well-formed Marmara stake matching the referenced UTXO.
    Ok,
    /// Not a Marmara stake; the PoS layer must not accept it.
    NotStake,
}

/// Decide whether `stake_tx` is a well-formed Marmara stake for the staking
/// UTXO whose opret is `vintx_opret` and whose address is `destaddr`.
///
/// The stake tx must have exactly one output, a crypto-condition one, with
/// the opret in its cc data blob (the trailing-vout site carries PoS data on
/// stake txns and is ignored here). The predicate is pure given its inputs.
pub fn validate_stake_tx(
    destaddr: &str,
    vintx_opret: &[u8],
    stake_tx: &Transaction,
    height: Height,
) -> StakeVerdict {
    debug!(
        tx_id = %stake_tx.txid(),
        nvouts = stake_tx.outputs.len(),
        height,
        "checking stake tx"
    );

    if stake_tx.outputs.len() != 1 || !stake_tx.outputs[0].script.is_cc() {
        debug!(tx_id = %stake_tx.txid(), "incorrect stake tx vout num");
        return StakeVerdict::NotStake;
    }

    if let Some((opret, _, raw)) = vout_opret(stake_tx, 0, &OpretChecker::activated()) {
        if raw != vintx_opret {
            debug!("found activated opret not equal to vintx opret");
            return StakeVerdict::NotStake;
        }
        let Some(owner_pk) = opret.pubkey().copied() else {
            return StakeVerdict::NotStake;
        };
        let opret_addr = cc_1of2_address(MARMARA_EVAL, &MODULE_PUBKEY, &owner_pk);
        if destaddr != opret_addr {
            debug!(destaddr, %opret_addr, "found bad activated opret address");
            return StakeVerdict::NotStake;
        }
        info!(destaddr, "found correct activated stake opret");
        return StakeVerdict::Ok;
    }

    if let Some((opret, _, raw)) = vout_opret(stake_tx, 0, &OpretChecker::lock_in_loop_cc_only()) {
        if raw != vintx_opret {
            debug!("found bad lock-in-loop opret not equal to vintx opret");
            return StakeVerdict::NotStake;
        }
        let create_txid = match &opret {
            MarmaraOpret::Locked { create_txid, .. }
            | MarmaraOpret::Issue { create_txid, .. }
            | MarmaraOpret::Transfer { create_txid, .. } => create_txid,
            _ => return StakeVerdict::NotStake,
        };
        let loop_pk = PubKey::from_txid(create_txid);
        let opret_addr = cc_1of2_address(MARMARA_EVAL, &MODULE_PUBKEY, &loop_pk);
        if destaddr != opret_addr {
            debug!(destaddr, %opret_addr, "found bad locked-in-loop opret address");
            return StakeVerdict::NotStake;
        }
        info!(destaddr, "found correct locked-in-loop stake opret");
        return StakeVerdict::Ok;
    }

    StakeVerdict::NotStake
}

/// Stake weight multiplier of a vout: tripled for the boosted coinbase kind,
/// single otherwise.
pub fn stake_multiplier(tx: &Transaction, nvout: usize) -> i32 {
    if let Some((opret, _, _)) = vout_opret(tx, nvout, &OpretChecker::activated()) {
        if let MarmaraOpret::Activated { kind, .. } = opret {
            if kind == ActivatedKind::Coinbase3x {
                return 3;
            }
        }
    }
    1
}
