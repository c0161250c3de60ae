//! Credit-loop traversal.
//!
//! A loop's history is a linear chain of transactions linked by the baton
//! vout: the creation tx's baton is spent by the issue, the issue's by the
//! first transfer, and so on. Only the newest link's baton is unspent. These
//! helpers reconstruct that chain and extract the loop's creation parameters.

use crate::classifier::locked_in_loop_pubkey;
use crate::params::{BATON_AMOUNT, BATON_VOUT, OPENCLOSE_VOUT};
use crate::{FuncId, MarmaraOpret};
use marmara_chain::{Amount, ChainView, Height, PubKey, SpentInfo, TxId};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from loop traversal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// A transaction in the loop could not be loaded or is unconfirmed.
    #[error("could not get tx {0}")]
    TxNotFound(TxId),

    /// No creation txid could be resolved for the query tx.
    #[error("could not get createtxid for txid {0}")]
    NoCreateTxid(TxId),

    /// The baton chain is spent all the way through with no live baton left.
    #[error("bad credit loop for txid {0}")]
    BadLoop(TxId),

    /// A transfer tx unexpectedly carries no locked-in-loop vouts.
    #[error("no locked-in-loop vouts in transfer tx {0}")]
    NoLockedVouts(TxId),

    /// The prev tx's opret is not a loop kind the traversal understands.
    #[error("incorrect funcid in prev tx {0}")]
    UnexpectedFuncId(TxId),

    /// The creation tx could not be loaded or does not carry a creation opret.
    #[error("could not get credit loop creation data for {0}")]
    NoCreationData(TxId),
}

/// Parameters fixed at loop creation, never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopCreation {
    /// The creation tx.
    pub create_txid: TxId,
    /// Pubkey the creation opret names (the party credit is requested from).
    pub pk: PubKey,
    /// Loop principal.
    pub amount: Amount,
    /// Height at which the loop becomes eligible for settlement.
    pub matures: Height,
    /// Currency tag.
    pub currency: String,
}

/// A reconstructed credit loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditLoop {
    /// Txids whose baton vout has been spent, creation tx first.
    pub chain: Vec<TxId>,
    /// The newest chain link; its baton vout is unspent.
    pub baton_txid: TxId,
    /// Set when the live baton's value differs from the fixed baton amount.
    /// Such a baton is accepted but terminal.
    pub false_baton: bool,
}

impl CreditLoop {
    /// The creation tx of this loop.
    pub fn create_txid(&self) -> TxId {
        self.chain[0]
    }

    /// Number of endorsement steps (issue plus transfers) in the loop.
    pub fn endorser_count(&self) -> usize {
        self.chain.len()
    }
}

/// Resolve the creation txid for any transaction in a credit loop.
///
/// Request/issue/transfer/locked oprets carry it; a creation tx is its own
/// creation txid. Returns `None` for unconfirmed or non-loop transactions.
pub fn create_txid_of<V: ChainView + ?Sized>(view: &V, txid: &TxId) -> Option<TxId> {
    let (tx, block) = view.get_tx(txid)?;
    if block.is_none() || tx.outputs.len() < 2 {
        debug!(%txid, "creation txid unavailable: unconfirmed or too few vouts");
        return None;
    }
    let opret = MarmaraOpret::decode(tx.tail_op_return()?)?;
    match &opret {
        MarmaraOpret::Request { create_txid, .. }
        | MarmaraOpret::Issue { create_txid, .. }
        | MarmaraOpret::Transfer { create_txid, .. }
        | MarmaraOpret::Locked { create_txid, .. } => Some(*create_txid),
        MarmaraOpret::Create { .. } => Some(*txid),
        _ => None,
    }
}

/// Walk forward from any loop transaction to the latest unspent baton.
///
/// Returns `Ok(None)` for an empty loop (the creation tx's baton is still
/// unspent) and [`LoopError::BadLoop`] when a spent chain never terminates in
/// a live baton. A chain link whose baton value differs from the fixed amount
/// is accepted as terminal but flagged.
pub fn latest_baton<V: ChainView + ?Sized>(
    view: &V,
    query_txid: &TxId,
) -> Result<Option<CreditLoop>, LoopError> {
    let create_txid =
        create_txid_of(view, query_txid).ok_or(LoopError::NoCreateTxid(*query_txid))?;

    let mut chain = Vec::new();
    let mut txid = create_txid;
    while let Some(SpentInfo { spender, .. }) = view.spent_of(&txid, BATON_VOUT) {
        chain.push(txid);
        match view.utxo_value(&spender, BATON_VOUT) {
            Some(value) if value == BATON_AMOUNT => {
                return Ok(Some(CreditLoop {
                    chain,
                    baton_txid: spender,
                    false_baton: false,
                }));
            }
            Some(value) if value > 0 => {
                warn!(n = chain.len(), baton = %spender, value, "found and will use false baton");
                return Ok(Some(CreditLoop {
                    chain,
                    baton_txid: spender,
                    false_baton: true,
                }));
            }
            _ => txid = spender,
        }
    }

    if chain.is_empty() {
        Ok(None)
    } else {
        warn!(%query_txid, n = chain.len(), "baton chain fully spent, bad loop");
        Err(LoopError::BadLoop(*query_txid))
    }
}

/// Count of endorsers already in the loop, derived from the predecessor tx's
/// own outputs: 0 for a creation tx, 1 for an issue, the number of
/// locked-in-loop vouts for a transfer. Returns the creation txid alongside.
///
/// This deliberately never consults the spent index: during validation the
/// transaction being checked is not reliably reflected there yet, so the
/// count must come from the predecessor alone.
pub fn loop_endorsers_of<V: ChainView + ?Sized>(
    view: &V,
    prev_txid: &TxId,
) -> Result<(TxId, usize), LoopError> {
    let (tx, block) = view
        .get_tx(prev_txid)
        .ok_or(LoopError::TxNotFound(*prev_txid))?;
    if block.is_none() || tx.outputs.len() < 2 {
        return Err(LoopError::TxNotFound(*prev_txid));
    }
    let opret = tx
        .tail_op_return()
        .and_then(MarmaraOpret::decode)
        .ok_or(LoopError::UnexpectedFuncId(*prev_txid))?;

    match &opret {
        MarmaraOpret::Create { .. } => Ok((*prev_txid, 0)),
        MarmaraOpret::Issue { create_txid, .. } => Ok((*create_txid, 1)),
        MarmaraOpret::Transfer { create_txid, .. } => {
            let mut n = 0;
            for nvout in 0..tx.outputs.len().saturating_sub(1) {
                if tx.outputs[nvout].script.is_cc()
                    && locked_in_loop_pubkey(&tx, nvout).is_some()
                {
                    n += 1;
                }
            }
            if n == 0 {
                return Err(LoopError::NoLockedVouts(*prev_txid));
            }
            Ok((*create_txid, n))
        }
        _ => Err(LoopError::UnexpectedFuncId(*prev_txid)),
    }
}

/// Load the creation tx and extract its parameters, insisting the tail opret
/// really is a creation opret so no other loop tx kind can masquerade as one.
pub fn loop_creation_data<V: ChainView + ?Sized>(
    view: &V,
    create_txid: &TxId,
) -> Result<LoopCreation, LoopError> {
    let (tx, block) = view
        .get_tx(create_txid)
        .ok_or(LoopError::NoCreationData(*create_txid))?;
    if block.is_none() || tx.outputs.len() < 2 {
        return Err(LoopError::NoCreationData(*create_txid));
    }
    let raw = tx
        .tail_op_return()
        .ok_or(LoopError::NoCreationData(*create_txid))?;
    // cheap header probe before the full parse
    if raw.len() < 2 || raw[1] != FuncId::Create.as_byte() {
        return Err(LoopError::NoCreationData(*create_txid));
    }
    match MarmaraOpret::decode(raw) {
        Some(MarmaraOpret::Create {
            pk,
            amount,
            matures,
            currency,
        }) => Ok(LoopCreation {
            create_txid: *create_txid,
            pk,
            amount,
            matures,
            currency,
        }),
        _ => Err(LoopError::NoCreationData(*create_txid)),
    }
}

/// The settlement spender of an issue tx's open/close marker, if any.
pub fn settlement_spender_of<V: ChainView + ?Sized>(
    view: &V,
    issue_txid: &TxId,
) -> Option<SpentInfo> {
    view.spent_of(issue_txid, OPENCLOSE_VOUT)
}
