//! Read-only views of the host chain state.
//!
//! Validation is synchronous and side-effect free: every ledger fact a
//! validator needs comes through [`ChainView`]. Construction paths (and only
//! those) may additionally consult [`MempoolView`].

use crate::{Amount, BlockHash, Height, PubKey, Transaction, TxId};

/// Where and how a transaction output was spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpentInfo {
    /// The spending transaction.
    pub spender: TxId,
    /// Input index within the spender.
    pub vin: u32,
    /// Height of the block containing the spender.
    pub height: Height,
}

/// Read-only view of confirmed chain state.
///
/// Implementations must answer from the chain only; mempool contents are
/// invisible here. A `None` block hash from [`ChainView::get_tx`] marks a
/// transaction that is known but not yet confirmed, which several consensus
/// rules reject explicitly.
pub trait ChainView {
    /// Load a transaction and the hash of its containing block, if confirmed.
    fn get_tx(&self, txid: &TxId) -> Option<(Transaction, Option<BlockHash>)>;

    /// Who spent the given output, if it is spent in the chain.
    fn spent_of(&self, txid: &TxId, vout: u32) -> Option<SpentInfo>;

    /// Value of the given output if it is currently unspent, `None` otherwise.
    fn utxo_value(&self, txid: &TxId, vout: u32) -> Option<Amount>;

    /// Height of the chain tip.
    fn current_height(&self) -> Height;

    /// Median-time-past of the chain tip. Fork gating keys off this, never
    /// off the local clock.
    fn latest_timestamp(&self) -> u32;
}

/// Read-only view of the mempool, for construction paths only.
pub trait MempoolView {
    /// Whether some mempool transaction spends the given output.
    fn has_spender_of(&self, txid: &TxId, vout: u32) -> bool;
}

/// Total value of `tx`'s normal inputs that are funded by P2PK outputs paying
/// `pk`.
///
/// This is the "did this pubkey sign the transaction" probe used by the
/// request-tx rules: a positive total means `pk` contributed (and therefore
/// signed) at least one normal input.
pub fn total_normal_inputs_of<V: ChainView + ?Sized>(
    view: &V,
    tx: &Transaction,
    pk: &PubKey,
) -> Amount {
    let mut total: Amount = 0;
    for vin in &tx.inputs {
        if vin.script_sig.is_cc() || vin.script_sig.signer() != pk {
            continue;
        }
        let Some((prev_tx, _)) = view.get_tx(&vin.prevout.txid) else {
            continue;
        };
        let Some(prev_out) = prev_tx.outputs.get(vin.prevout.vout as usize) else {
            continue;
        };
        if prev_out.script.p2pk_pubkey() == Some(pk) {
            total += prev_out.value;
        }
    }
    total
}
