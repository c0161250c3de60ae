//! The settlement driver.
//!
//! Given a matured loop's latest baton, assembles the transaction that
//! returns the locked principal to the current holder: a full settlement
//! when the collected pot covers the principal, a partial one otherwise.
//! Everything produced here passes the settlement validator.

use crate::{TxBuildError, TxBuildResult};
use marmara_consensus::params::{MARMARA_EVAL, OPENCLOSE_VOUT};
use marmara_consensus::{
    latest_baton, locked_in_loop_pubkey, loop_creation_data, settlement_spender_of, MarmaraOpret,
};
use marmara_chain::{
    Amount, ChainView, MempoolView, OutPoint, PubKey, ScriptPubKey, ScriptSig, Transaction, TxId,
    TxIn, TxOut,
};
use tracing::{debug, info};

/// Build the settlement transaction for the loop holding `baton_txid`.
///
/// Input 0 spends the issue tx's open/close marker, signalling the loop's
/// terminal state; the remaining inputs drain every unspent locked vout in
/// the loop. All loop-guarded inputs are signed with the txid-derived loop
/// key, whose private half is public by construction.
pub fn build_settlement<V, M>(
    view: &V,
    mempool: &M,
    baton_txid: &TxId,
) -> TxBuildResult<Transaction>
where
    V: ChainView + ?Sized,
    M: MempoolView + ?Sized,
{
    let credit_loop = latest_baton(view, baton_txid)?.ok_or(TxBuildError::EmptyLoop(*baton_txid))?;
    let create_txid = credit_loop.create_txid();
    let creation = loop_creation_data(view, &create_txid)?;

    let height = view.current_height();
    if height < creation.matures {
        return Err(TxBuildError::NotMatured {
            matures: creation.matures,
            height,
        });
    }

    // the issue tx is the first link after creation; a freshly issued loop
    // has it as the live baton itself
    let issue_txid = credit_loop
        .chain
        .get(1)
        .copied()
        .unwrap_or(credit_loop.baton_txid);

    if settlement_spender_of(view, &issue_txid).is_some()
        || mempool.has_spender_of(&issue_txid, OPENCLOSE_VOUT)
    {
        return Err(TxBuildError::AlreadySettled);
    }

    let (baton_tx, _) = view
        .get_tx(&credit_loop.baton_txid)
        .ok_or(TxBuildError::EmptyLoop(*baton_txid))?;
    let holder_pk = match baton_tx.tail_op_return().and_then(MarmaraOpret::decode) {
        Some(MarmaraOpret::Issue { pk, .. }) | Some(MarmaraOpret::Transfer { pk, .. }) => pk,
        _ => return Err(TxBuildError::NoHolder(credit_loop.baton_txid)),
    };

    let loop_pk = PubKey::from_txid(&create_txid);
    let loop_sig = ScriptSig::Cc {
        eval: MARMARA_EVAL,
        signer: loop_pk,
    };

    // drain every still-unspent locked vout across the loop's history; after
    // a clean sequence of transfers only the latest baton tx carries any
    let mut inputs = vec![TxIn::new(OutPoint::new(issue_txid, OPENCLOSE_VOUT), loop_sig)];
    let mut pot: Amount = 0;
    let loop_txids = credit_loop
        .chain
        .iter()
        .chain(std::iter::once(&credit_loop.baton_txid));
    for txid in loop_txids {
        let Some((tx, _)) = view.get_tx(txid) else {
            continue;
        };
        for nvout in 0..tx.outputs.len().saturating_sub(1) {
            if locked_in_loop_pubkey(&tx, nvout).is_none() {
                continue;
            }
            let Some(value) = view.utxo_value(txid, nvout as u32) else {
                continue;
            };
            inputs.push(TxIn::new(OutPoint::new(*txid, nvout as u32), loop_sig));
            pot += value;
        }
    }

    if pot == 0 {
        return Err(TxBuildError::EmptyPot(*baton_txid));
    }
    debug!(pot, principal = creation.amount, holder = %holder_pk, "collected loop pot");

    let mut outputs = Vec::with_capacity(3);
    let opret = if pot >= creation.amount {
        outputs.push(TxOut::new(creation.amount, ScriptPubKey::p2pk(holder_pk)));
        let change = pot - creation.amount;
        if change > 0 {
            outputs.push(TxOut::new(change, ScriptPubKey::p2pk(creation.pk)));
        }
        MarmaraOpret::Settle {
            create_txid,
            pk: holder_pk,
            remaining: 0,
        }
    } else {
        outputs.push(TxOut::new(pot, ScriptPubKey::p2pk(holder_pk)));
        MarmaraOpret::SettlePartial {
            create_txid,
            pk: holder_pk,
            remaining: creation.amount - pot,
        }
    };
    outputs.push(TxOut::new(0, ScriptPubKey::op_return(opret.encode())));

    let tx = Transaction {
        inputs,
        outputs,
        coinbase: false,
        nonce: 0,
    };
    info!(
        tx_id = %tx.txid(),
        %create_txid,
        pot,
        full = pot >= creation.amount,
        "assembled settlement tx"
    );
    Ok(tx)
}
