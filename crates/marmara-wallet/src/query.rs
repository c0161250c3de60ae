//! Read-only credit-loop queries for wallet and RPC surfaces.

use crate::TxBuildResult;
use marmara_consensus::{
    create_txid_of, latest_baton, loop_creation_data, settlement_spender_of, FuncId, LoopError,
    MarmaraOpret,
};
use marmara_chain::{Amount, ChainView, Height, PubKey, TxId};
use serde::{Deserialize, Serialize};

/// Where a loop stands in its lifecycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum LoopStatus {
    /// Created, not yet issued.
    Created,
    /// Issued and circulating.
    Open,
    /// Fully settled.
    Settled,
    /// Partially settled; some principal stays owed.
    PartiallySettled,
}

/// One endorsement step in a loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopEndorser {
    /// The issue or transfer tx.
    pub txid: TxId,
    /// The receiver it handed the obligation to.
    pub pk: PubKey,
}

/// Everything a wallet wants to show about one credit loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopInfo {
    /// Creation tx of the loop.
    pub create_txid: TxId,
    /// Currency tag fixed at creation.
    pub currency: String,
    /// Principal fixed at creation.
    pub amount: Amount,
    /// Maturity height fixed at creation.
    pub matures: Height,
    /// The party credit was requested from.
    pub issuer_pk: PubKey,
    /// Endorsement steps, oldest first.
    pub endorsers: Vec<LoopEndorser>,
    /// Current holder, when the loop is open.
    pub holder_pk: Option<PubKey>,
    /// The live baton tx, when the loop is open.
    pub baton_txid: Option<TxId>,
    /// The settlement tx, once one exists.
    pub settlement_txid: Option<TxId>,
    /// Lifecycle status.
    pub status: LoopStatus,
}

fn endorser_of<V: ChainView + ?Sized>(view: &V, txid: &TxId) -> Option<LoopEndorser> {
    let (tx, _) = view.get_tx(txid)?;
    match tx.tail_op_return().and_then(MarmaraOpret::decode) {
        Some(MarmaraOpret::Issue { pk, .. }) | Some(MarmaraOpret::Transfer { pk, .. }) => {
            Some(LoopEndorser { txid: *txid, pk })
        }
        _ => None,
    }
}

/// Reconstruct the public state of the credit loop containing `txid`.
pub fn query_credit_loop<V: ChainView + ?Sized>(view: &V, txid: &TxId) -> TxBuildResult<LoopInfo> {
    let create_txid = create_txid_of(view, txid).ok_or(LoopError::NoCreateTxid(*txid))?;
    let creation = loop_creation_data(view, &create_txid)?;

    let Some(credit_loop) = latest_baton(view, txid)? else {
        return Ok(LoopInfo {
            create_txid,
            currency: creation.currency,
            amount: creation.amount,
            matures: creation.matures,
            issuer_pk: creation.pk,
            endorsers: Vec::new(),
            holder_pk: None,
            baton_txid: None,
            settlement_txid: None,
            status: LoopStatus::Created,
        });
    };

    let endorsers: Vec<LoopEndorser> = credit_loop
        .chain
        .iter()
        .skip(1)
        .chain(std::iter::once(&credit_loop.baton_txid))
        .filter_map(|t| endorser_of(view, t))
        .collect();
    let holder_pk = endorsers.last().map(|e| e.pk);

    let issue_txid = credit_loop
        .chain
        .get(1)
        .copied()
        .unwrap_or(credit_loop.baton_txid);

    let mut settlement_txid = None;
    let mut status = LoopStatus::Open;
    if let Some(spent) = settlement_spender_of(view, &issue_txid) {
        settlement_txid = Some(spent.spender);
        status = match view
            .get_tx(&spent.spender)
            .and_then(|(tx, _)| tx.tail_op_return().and_then(MarmaraOpret::decode))
            .map(|opret| opret.func_id())
        {
            Some(FuncId::SettlePartial) => LoopStatus::PartiallySettled,
            _ => LoopStatus::Settled,
        };
    }

    Ok(LoopInfo {
        create_txid,
        currency: creation.currency,
        amount: creation.amount,
        matures: creation.matures,
        issuer_pk: creation.pk,
        endorsers,
        holder_pk,
        baton_txid: Some(credit_loop.baton_txid),
        settlement_txid,
        status,
    })
}
