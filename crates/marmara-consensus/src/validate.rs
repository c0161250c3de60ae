//! Transaction validators.
//!
//! The top-level validator computes the set of func ids appearing across a
//! transaction's outputs and dispatches on it. Issue and transfer
//! transactions get the full credit-loop treatment: request verification,
//! share arithmetic, endorser-set continuity and redistribution checks.
//! Settlement transactions are checked against the reconstructed loop.
//!
//! Validators are pure given the chain view: no mempool access, no caching
//! across calls, no mutation.

use crate::classifier::{activated_pubkey, locked_in_loop_pubkey, vout_opret, OpretChecker};
use crate::error::ValidationError;
use crate::loops::{latest_baton, loop_creation_data, loop_endorsers_of};
use crate::params::{LOOP_TOLERANCE, MARMARA_EVAL, MODULE_PUBKEY, OPENCLOSE_VOUT};
use crate::{FuncId, MarmaraOpret, ValidationContext, ValidationResult};
use marmara_chain::{total_normal_inputs_of, Amount, ChainView, PubKey, Transaction, TxId};
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

fn invalid(msg: impl Into<String>) -> ValidationError {
    ValidationError::invalid(msg)
}

fn rule(msg: impl Into<String>) -> ValidationError {
    ValidationError::rule(msg)
}

fn func_set(ids: &[FuncId]) -> BTreeSet<FuncId> {
    ids.iter().copied().collect()
}

/// Collect the func ids visible across the transaction's outputs, trying the
/// activated interpretation of each vout first and the loop interpretation
/// second.
fn scan_func_ids(tx: &Transaction) -> BTreeSet<FuncId> {
    let mut ids = BTreeSet::new();
    for nvout in 0..tx.outputs.len() {
        if let Some((opret, _, _)) = vout_opret(tx, nvout, &OpretChecker::activated()) {
            ids.insert(opret.func_id());
        } else if let Some((opret, _, _)) = vout_opret(tx, nvout, &OpretChecker::lock_in_loop()) {
            ids.insert(opret.func_id());
        }
    }
    ids
}

/// Reject any transaction the module's well-known key signed; its private
/// half is public, so it can never be a legitimate spender.
fn check_no_module_signer(tx: &Transaction) -> ValidationResult<()> {
    if tx
        .inputs
        .iter()
        .any(|vin| vin.script_sig.signer() == &MODULE_PUBKEY)
    {
        return Err(rule("cannot spend marmara coins using the marmara global pubkey"));
    }
    Ok(())
}

/// Validate a Marmara-tagged transaction.
///
/// Returns `Ok(())` for acceptance; the two error variants carry the host's
/// invalid-vs-rule-violation severity split.
#[instrument(skip(ctx, view, tx), fields(tx_id = %tx.txid(), height = ctx.height))]
pub fn validate_tx<V: ChainView + ?Sized>(
    ctx: &ValidationContext,
    view: &V,
    tx: &Transaction,
) -> ValidationResult<()> {
    if !ctx.marmara_enabled {
        return Err(invalid("-ac_marmara must be set for marmara CC"));
    }
    if tx.outputs.is_empty() {
        return Err(invalid("no vouts"));
    }
    if tx.inputs.len() > ctx.rules.max_vins {
        return Err(invalid("too many vins"));
    }

    let func_ids = scan_func_ids(tx);
    if func_ids.is_empty() {
        return Err(invalid("invalid or no opreturns"));
    }

    use FuncId::*;
    let verdict = if func_ids == func_set(&[Pool]) {
        check_pool_tx(view, tx)
    } else if func_ids == func_set(&[Loop]) {
        // loop payment txns are funded from normal inputs and never reach
        // cc validation legitimately
        Err(rule("loop payment txns must not have cc inputs"))
    } else if func_ids == func_set(&[Create]) {
        Err(rule("create loop txns must not have cc inputs"))
    } else if func_ids == func_set(&[Request]) {
        Err(rule("request txns must not have cc inputs"))
    } else if func_ids == func_set(&[Issue])
        || func_ids == func_set(&[Issue, Locked])
        || func_ids == func_set(&[Activated, Issue, Locked])
        || func_ids == func_set(&[Transfer])
        || func_ids == func_set(&[Transfer, Locked])
        || func_ids == func_set(&[Activated, Transfer, Locked])
    {
        check_issue_tx(ctx, view, tx)
    } else if func_ids == func_set(&[Settle]) || func_ids == func_set(&[SettlePartial]) {
        check_settlement_tx(ctx, view, tx)
    } else if func_ids == func_set(&[Coinbase]) || func_ids == func_set(&[Coinbase3x]) {
        // shape is enforced by the coinbase rules at block acceptance
        Ok(())
    } else if func_ids == func_set(&[Locked])
        || func_ids == func_set(&[Activated])
        || func_ids == func_set(&[ActivatedInitial])
    {
        // rechecked by the PoS validator when staked
        Ok(())
    } else if func_ids == func_set(&[Release]) {
        Ok(())
    } else {
        let observed: String = func_ids.iter().map(|f| f.as_byte() as char).collect();
        warn!(tx_id = %tx.txid(), funcids = %observed, "tx has bad funcid set");
        Err(invalid("fall through error"))
    };

    if let Err(err) = &verdict {
        debug!(tx_id = %tx.txid(), %err, "validation rejected tx");
    }
    verdict
}

/// Pool transactions may only gather coinbases that match the pool opret's
/// owner and unlock height.
fn check_pool_tx<V: ChainView + ?Sized>(view: &V, tx: &Transaction) -> ValidationResult<()> {
    let Some(MarmaraOpret::Activated {
        pk, unlock_height, ..
    }) = tx.tail_op_return().and_then(MarmaraOpret::decode)
    else {
        return Err(invalid("cannot decode pool tx opreturn"));
    };

    for vin in &tx.inputs {
        if !vin.script_sig.is_cc_for(MARMARA_EVAL) {
            continue;
        }
        let Some((vintx, _)) = view.get_tx(&vin.prevout.txid) else {
            return Err(invalid("cant find vinTx"));
        };
        if !vintx.coinbase {
            return Err(invalid("noncoinbase input"));
        }
        if vintx.outputs.len() != 2 {
            return Err(invalid("coinbase doesnt have 2 vouts"));
        }
        match vintx.outputs[1]
            .script
            .op_return_data()
            .and_then(MarmaraOpret::decode)
        {
            Some(MarmaraOpret::Activated {
                kind,
                pk: vpk,
                unlock_height: vunlock,
                ..
            }) if kind.func_id() == FuncId::Coinbase && vpk == pk && vunlock == unlock_height => {}
            _ => return Err(invalid("mismatched opreturn")),
        }
    }
    Ok(())
}

/// Validate the request (or creation) tx an issue/transfer spends.
///
/// The receiver named by the issue/transfer must have signed the request with
/// normal inputs, and the counterparty named inside the request must not have
/// co-signed it: credit cannot be requested from oneself.
fn check_request_tx<V: ChainView + ?Sized>(
    ctx: &ValidationContext,
    view: &V,
    request_txid: &TxId,
    receiver_pk: &PubKey,
    issue_func: FuncId,
) -> ValidationResult<()> {
    debug!(%request_txid, "checking request tx");

    if request_txid.is_zero() {
        return Err(invalid("requesttxid can't be empty"));
    }
    let create_txid = crate::loops::create_txid_of(view, request_txid).ok_or_else(|| {
        invalid("can't get createtxid from requesttxid (request tx could be in mempool)")
    })?;
    let creation = loop_creation_data(view, &create_txid)
        .map_err(|_| invalid("cannot get loop creation data"))?;

    let Some((request_tx, block)) = view.get_tx(request_txid) else {
        return Err(invalid("cannot get request transaction"));
    };
    if block.is_none() {
        return Err(invalid("request transaction still in mempool"));
    }
    let Some(request_opret) = request_tx.tail_op_return().and_then(MarmaraOpret::decode) else {
        return Err(invalid("cannot decode request tx opreturn data"));
    };
    let Some(sender_pk) = request_opret.pubkey().copied() else {
        return Err(invalid("cannot decode request tx opreturn data"));
    };

    if total_normal_inputs_of(view, &request_tx, receiver_pk) == 0 {
        return Err(invalid("receiver pubkey does not match signer of request tx"));
    }
    if total_normal_inputs_of(view, &request_tx, &sender_pk) > 0 {
        return Err(invalid(
            "sender pk signed request tx, cannot request credit from self",
        ));
    }
    if creation.matures <= ctx.height {
        return Err(rule("credit loop must mature in the future"));
    }

    match issue_func {
        FuncId::Issue if request_opret.func_id() != FuncId::Create => {
            Err(invalid("not a create tx"))
        }
        FuncId::Transfer if request_opret.func_id() != FuncId::Request => {
            Err(invalid("not a request tx"))
        }
        _ => Ok(()),
    }
}

/// Check the locked-in-loop vouts and the redistribution arithmetic of an
/// issue or transfer tx.
///
/// With N endorsers already in the loop:
/// - each locked vout must hold `principal / (N + 1)` within tolerance, and
///   together they must re-lock the whole principal;
/// - every prior endorser except the newly joining one must be paid its
///   share back to a normal output, totalling `N / (N + 1)` of the principal;
/// - the locked vout pubkeys must be exactly the spent locked vins' pubkeys
///   plus the one new endorser at vout position zero.
fn check_lcl_redistribution<V: ChainView + ?Sized>(
    ctx: &ValidationContext,
    view: &V,
    tx: &Transaction,
    prev_txid: &TxId,
    start_vin: usize,
) -> ValidationResult<()> {
    debug!(%prev_txid, start_vin, "checking lcl redistribution");

    // the tx under validation is not reliably in the spent index yet, so the
    // endorser count must come from the predecessor's outputs alone
    let (create_txid, n_prev) = loop_endorsers_of(view, prev_txid)
        .map_err(|_| rule("could not get credit loop endorsers number"))?;
    let creation = loop_creation_data(view, &create_txid)
        .map_err(|_| rule("could not get credit loop creation data"))?;

    if n_prev + 1 > ctx.rules.max_endorsers {
        return Err(rule("too many endorsers in credit loop"));
    }

    if tx.outputs.is_empty() || tx.tail_op_return().and_then(MarmaraOpret::decode).is_none() {
        return Err(rule(
            "no opreturn found in the last vout of issue/transfer tx",
        ));
    }

    let divisor = n_prev as Amount + 1;
    let share = creation.amount / divisor;
    let loop_pk = PubKey::from_txid(&create_txid);

    // enumerate locked vouts: values and pubkeys, in declared order
    let mut lcl_amount: Amount = 0;
    let mut endorser_pks: Vec<PubKey> = Vec::new();
    for nvout in 0..tx.outputs.len() - 1 {
        let out = &tx.outputs[nvout];
        if !out.script.is_cc() {
            continue;
        }
        let Some(raw) = out.script.cc_data() else {
            continue;
        };
        let Some(MarmaraOpret::Locked { pk, .. }) = MarmaraOpret::decode(raw) else {
            continue;
        };
        let expected = marmara_chain::ScriptPubKey::cc_1of2(
            MARMARA_EVAL,
            MODULE_PUBKEY,
            loop_pk,
            Some(raw.to_vec()),
        );
        if out.script != expected {
            return Err(rule("MARMARA_LOCKED cc output incorrect: pubkey does not match"));
        }
        let diff = out.value - share;
        if diff.abs() > LOOP_TOLERANCE {
            warn!(
                nvout,
                value = out.value,
                share,
                n_prev,
                "locked vout amount out of tolerance"
            );
            return Err(rule("MARMARA_LOCKED cc output amount incorrect"));
        }
        lcl_amount += out.value;
        endorser_pks.push(pk);
    }

    // together the locked vouts must re-lock the principal
    if (creation.amount - lcl_amount).abs() > divisor * LOOP_TOLERANCE {
        return Err(rule("tx LCL amount invalid"));
    }

    if endorser_pks.is_empty() {
        return Err(rule("no locked vouts in issue/transfer tx"));
    }
    // the newest endorser sits at locked vout position zero and receives no
    // redistribution
    let latest_pk = endorser_pks.remove(0);

    if endorser_pks.len() != n_prev {
        return Err(rule("incorrect number of endorsers pubkeys found in tx"));
    }

    if n_prev != 0 {
        let mut redistributed: Amount = 0;
        for out in &tx.outputs {
            let Some(vpk) = out.script.p2pk_pubkey() else {
                continue;
            };
            if !endorser_pks.contains(vpk) {
                continue;
            }
            let diff = out.value - share;
            if diff.abs() > LOOP_TOLERANCE {
                warn!(
                    value = out.value,
                    share, n_prev, "normal payout out of tolerance"
                );
                return Err(rule("normal output amount incorrect"));
            }
            redistributed += out.value;
        }
        // everything but the newest share flows back to the prior endorsers
        let diff = lcl_amount - lcl_amount / divisor - redistributed;
        if diff.abs() > n_prev as Amount * LOOP_TOLERANCE {
            warn!(
                lcl_amount,
                redistributed, n_prev, "aggregate redistribution out of tolerance"
            );
            return Err(rule("invalid redistribution to normal outputs"));
        }
    }

    // the locked vins being spent name the prior endorser set
    let mut prev_pks: BTreeSet<PubKey> = BTreeSet::new();
    for (nvin, vin) in tx.inputs.iter().enumerate().skip(start_vin) {
        if !vin.script_sig.is_cc() {
            continue;
        }
        if !vin.script_sig.is_cc_for(MARMARA_EVAL) {
            return Err(rule("issue/transfer tx cannot have non-marmara cc vins"));
        }
        let Some((vintx, _)) = view.get_tx(&vin.prevout.txid) else {
            return Err(rule(format!(
                "issue/transfer tx: can't get vintx for vin={nvin}"
            )));
        };
        match locked_in_loop_pubkey(&vintx, vin.prevout.vout as usize) {
            Some(pk) => {
                prev_pks.insert(pk);
            }
            None => {
                return Err(rule("issue/transfer tx has unexpected non-lcl marmara cc vin"));
            }
        }
    }

    let vout_pks: BTreeSet<PubKey> = endorser_pks.iter().copied().collect();
    if vout_pks != prev_pks {
        warn!(
            latest = %latest_pk,
            vout_pks = vout_pks.len(),
            vin_pks = prev_pks.len(),
            "locked vin pubkeys do not match vout pubkeys"
        );
        return Err(rule("issue/transfer tx has incorrect loop pubkeys"));
    }
    Ok(())
}

/// Validate an issue or transfer transaction.
///
/// The input layout is positional: a leading run of activated cc vins funds
/// the tx, the first non-activated cc vin is the request (creation tx for an
/// issue, request tx for a transfer), a transfer then spends the previous
/// baton, and every remaining cc vin must be a locked-in-loop coin of the
/// previous loop state.
pub(crate) fn check_issue_tx<V: ChainView + ?Sized>(
    ctx: &ValidationContext,
    view: &V,
    tx: &Transaction,
) -> ValidationResult<()> {
    if tx.outputs.is_empty() {
        return Err(rule("bad issue or transfer tx: no vouts"));
    }
    let opret = tx.tail_op_return().and_then(MarmaraOpret::decode);
    let (issue_func, receiver_pk) = match &opret {
        Some(MarmaraOpret::Issue { pk, .. }) => (FuncId::Issue, *pk),
        Some(MarmaraOpret::Transfer { pk, .. }) => (FuncId::Transfer, *pk),
        _ => return Err(rule("not an issue or transfer tx")),
    };

    check_no_module_signer(tx)?;

    // leading run of activated cc vins, then the request vin
    let n_vins = tx.inputs.len();
    let mut i = 0usize;
    let mut activated_has_begun = false;
    while i < n_vins {
        let vin = &tx.inputs[i];
        if vin.script_sig.is_cc() {
            if !vin.script_sig.is_cc_for(MARMARA_EVAL) {
                return Err(rule("issue/transfer tx cannot have non-marmara cc vins"));
            }
            let Some((vintx, _)) = view.get_tx(&vin.prevout.txid) else {
                return Err(rule(format!(
                    "issue/transfer tx: can't get vintx for vin={i}"
                )));
            };
            if activated_pubkey(&vintx, vin.prevout.vout as usize).is_some() {
                activated_has_begun = true;
            } else if activated_has_begun {
                break;
            }
        }
        i += 1;
    }
    if i >= n_vins {
        return Err(rule("invalid issue/transfer tx: no request tx vin"));
    }
    let request_vin = i;

    check_request_tx(
        ctx,
        view,
        &tx.inputs[request_vin].prevout.txid,
        &receiver_pk,
        issue_func,
    )?;

    // the loop's previous state: the creation tx for an issue, the spent
    // baton's tx for a transfer
    let prev_txid = match issue_func {
        FuncId::Issue => tx.inputs[request_vin].prevout.txid,
        _ => {
            i += 1;
            if i >= n_vins {
                return Err(rule("no baton vin in transfer tx"));
            }
            let baton_txid = tx.inputs[i].prevout.txid;
            if let Some((baton_tx, _)) = view.get_tx(&baton_txid) {
                if !baton_tx.has_cc_input(MARMARA_EVAL) {
                    return Err(rule("no marmara cc vins in baton tx for transfer tx"));
                }
            }
            baton_txid
        }
    };

    check_lcl_redistribution(ctx, view, tx, &prev_txid, i + 1)
}

/// Validate a settlement transaction (full or partial).
pub(crate) fn check_settlement_tx<V: ChainView + ?Sized>(
    ctx: &ValidationContext,
    view: &V,
    tx: &Transaction,
) -> ValidationResult<()> {
    if tx.outputs.is_empty() {
        return Err(invalid("bad settlement tx: no vouts"));
    }
    if tx.inputs.is_empty() {
        return Err(invalid("bad settlement tx: no vins"));
    }

    let settle_func = match tx.tail_op_return().and_then(MarmaraOpret::decode) {
        Some(MarmaraOpret::Settle { .. }) => FuncId::Settle,
        Some(MarmaraOpret::SettlePartial { .. }) => FuncId::SettlePartial,
        _ => return Err(rule("not a settlement tx")),
    };

    check_no_module_signer(tx)?;

    // settlement is the spend of the issue tx's open/close marker
    if tx.inputs[0].prevout.vout != OPENCLOSE_VOUT {
        return Err(rule("incorrect settlement tx vin0"));
    }
    let issue_txid = tx.inputs[0].prevout.txid;
    let Some((issue_tx, _)) = view.get_tx(&issue_txid) else {
        return Err(rule("could not load issue tx"));
    };

    if ctx.rules.settlement_rechecks_issue {
        // pre-update behaviour, preserved exactly: the issue tx is re-run
        // through full issue validation and settlement proceeds only when
        // that fails. On a matured loop the re-check always trips the
        // request-maturity rule, so this de facto blocks only early
        // settlement.
        if check_issue_tx(ctx, view, &issue_tx).is_ok() {
            return Err(rule("issue tx still validates, cannot settle"));
        }
    } else {
        // the issue tx is already confirmed and was validated on acceptance;
        // only its shape is rechecked
        match issue_tx.tail_op_return().and_then(MarmaraOpret::decode) {
            Some(MarmaraOpret::Issue { .. }) | Some(MarmaraOpret::Transfer { .. }) => {}
            _ => return Err(rule("settlement does not refer to an issue or transfer tx")),
        }
    }

    // the issue tx sits in an earlier block, so the spent index is reliable
    // for the baton walk here
    let credit_loop = match latest_baton(view, &issue_txid) {
        Ok(Some(credit_loop)) => credit_loop,
        _ => return Err(rule("could not get credit loop or no endorsers")),
    };

    let creation = loop_creation_data(view, &credit_loop.create_txid())
        .map_err(|_| rule("could not get credit loop creation data"))?;

    if ctx.height < creation.matures {
        return Err(rule("credit loop does not mature yet"));
    }

    let Some((baton_tx, _)) = view.get_tx(&credit_loop.baton_txid) else {
        return Err(rule("could not load baton tx"));
    };
    if baton_tx.outputs.is_empty() {
        return Err(rule("bad baton tx: no vouts"));
    }
    let holder_pk = match baton_tx.tail_op_return().and_then(MarmaraOpret::decode) {
        Some(MarmaraOpret::Issue { pk, .. }) | Some(MarmaraOpret::Transfer { pk, .. }) => pk,
        _ => return Err(rule("baton tx not a issue or transfer tx")),
    };

    // sum normal payouts to the holder; any cc vout invalidates settlement
    let mut settled: Amount = 0;
    for out in &tx.outputs {
        if out.script.is_cc() {
            return Err(rule("settlement tx cannot have unknown cc vouts"));
        }
        if out.script.p2pk_pubkey() == Some(&holder_pk) {
            settled += out.value;
        }
    }

    let diff = creation.amount - settled;
    if settle_func == FuncId::Settle && diff > 0 {
        return Err(rule("payment to holder incorrect for full settlement"));
    }
    if settle_func == FuncId::SettlePartial && diff <= 0 {
        return Err(rule("payment to holder incorrect for partial settlement"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActivatedKind;
    use marmara_chain::{
        BlockHash, ScriptPubKey, ScriptSig, SpentInfo, TxOut,
    };

    /// Chain view with no transactions at all; enough for dispatch-level tests.
    struct EmptyChain;

    impl ChainView for EmptyChain {
        fn get_tx(&self, _txid: &TxId) -> Option<(Transaction, Option<BlockHash>)> {
            None
        }
        fn spent_of(&self, _txid: &TxId, _vout: u32) -> Option<SpentInfo> {
            None
        }
        fn utxo_value(&self, _txid: &TxId, _vout: u32) -> Option<Amount> {
            None
        }
        fn current_height(&self) -> i32 {
            200_000
        }
        fn latest_timestamp(&self) -> u32 {
            1_600_000_000
        }
    }

    fn ctx() -> ValidationContext {
        ValidationContext::new(200_000, 1_600_000_000, true)
    }

    fn pk(seed: u8) -> PubKey {
        let mut bytes = [seed; 33];
        bytes[0] = 0x02;
        PubKey(bytes)
    }

    fn coinbase_with_opret(owner: PubKey) -> Transaction {
        let opret = MarmaraOpret::Activated {
            kind: ActivatedKind::Coinbase,
            pk: owner,
            height: 10,
            unlock_height: 20,
        };
        Transaction {
            inputs: vec![],
            outputs: vec![
                TxOut::new(
                    1_000_000,
                    ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, owner, Some(opret.encode())),
                ),
                TxOut::new(0, ScriptPubKey::op_return(opret.encode())),
            ],
            coinbase: true,
            nonce: 11,
        }
    }

    #[test]
    fn test_rejects_when_not_marmara_chain() {
        let mut context = ctx();
        context.marmara_enabled = false;
        let tx = coinbase_with_opret(pk(1));
        assert_eq!(
            validate_tx(&context, &EmptyChain, &tx),
            Err(ValidationError::Invalid(
                "-ac_marmara must be set for marmara CC".into()
            ))
        );
    }

    #[test]
    fn test_rejects_no_vouts() {
        let tx = Transaction::default();
        assert_eq!(
            validate_tx(&ctx(), &EmptyChain, &tx),
            Err(ValidationError::Invalid("no vouts".into()))
        );
    }

    #[test]
    fn test_rejects_no_oprets() {
        let tx = Transaction {
            inputs: vec![],
            outputs: vec![TxOut::new(100, ScriptPubKey::p2pk(pk(1)))],
            coinbase: false,
            nonce: 1,
        };
        assert_eq!(
            validate_tx(&ctx(), &EmptyChain, &tx),
            Err(ValidationError::Invalid("invalid or no opreturns".into()))
        );
    }

    #[test]
    fn test_accepts_coinbase_shape() {
        let tx = coinbase_with_opret(pk(1));
        assert_eq!(validate_tx(&ctx(), &EmptyChain, &tx), Ok(()));
    }

    #[test]
    fn test_rejects_create_request_loop_kinds() {
        for opret in [
            MarmaraOpret::Create {
                pk: pk(1),
                amount: 1_000,
                matures: 10,
                currency: "MARMARA".into(),
            },
            MarmaraOpret::Request {
                create_txid: TxId([1; 32]),
                pk: pk(1),
            },
            MarmaraOpret::Loop,
        ] {
            let tx = Transaction {
                inputs: vec![],
                outputs: vec![
                    TxOut::new(10_000, ScriptPubKey::cc1(MARMARA_EVAL, pk(1), None)),
                    TxOut::new(0, ScriptPubKey::op_return(opret.encode())),
                ],
                coinbase: false,
                nonce: 2,
            };
            let verdict = validate_tx(&ctx(), &EmptyChain, &tx);
            assert!(
                matches!(verdict, Err(ValidationError::Rule(_))),
                "expected rule rejection for {:?}, got {:?}",
                opret.func_id(),
                verdict
            );
        }
    }

    #[test]
    fn test_rejects_mixed_funcid_set() {
        // an activated cc vout combined with a release opret is no
        // admissible combination
        let owner = pk(1);
        let activated = MarmaraOpret::Activated {
            kind: ActivatedKind::Activated,
            pk: owner,
            height: 1,
            unlock_height: 2,
        };
        let tx = Transaction {
            inputs: vec![],
            outputs: vec![
                TxOut::new(
                    5_000,
                    ScriptPubKey::cc_1of2(
                        MARMARA_EVAL,
                        MODULE_PUBKEY,
                        owner,
                        Some(activated.encode()),
                    ),
                ),
                // dataless cc vout picks the trailing release opret up via
                // the fallback carrier
                TxOut::new(5_000, ScriptPubKey::cc1(MARMARA_EVAL, owner, None)),
                TxOut::new(0, ScriptPubKey::op_return(MarmaraOpret::Release.encode())),
            ],
            coinbase: false,
            nonce: 3,
        };
        assert_eq!(
            validate_tx(&ctx(), &EmptyChain, &tx),
            Err(ValidationError::Invalid("fall through error".into()))
        );
    }

    #[test]
    fn test_module_signer_rejected() {
        let tx = Transaction {
            inputs: vec![marmara_chain::TxIn::new(
                marmara_chain::OutPoint::new(TxId([1; 32]), OPENCLOSE_VOUT),
                ScriptSig::Cc {
                    eval: MARMARA_EVAL,
                    signer: MODULE_PUBKEY,
                },
            )],
            outputs: vec![
                TxOut::new(100, ScriptPubKey::p2pk(pk(2))),
                TxOut::new(
                    0,
                    ScriptPubKey::op_return(
                        MarmaraOpret::Settle {
                            create_txid: TxId([1; 32]),
                            pk: pk(2),
                            remaining: 0,
                        }
                        .encode(),
                    ),
                ),
            ],
            coinbase: false,
            nonce: 4,
        };
        assert_eq!(
            validate_tx(&ctx(), &EmptyChain, &tx),
            Err(ValidationError::Rule(
                "cannot spend marmara coins using the marmara global pubkey".into()
            ))
        );
    }

    #[test]
    fn test_too_many_vins_rejected() {
        let mut tx = coinbase_with_opret(pk(1));
        tx.coinbase = false;
        let vin = marmara_chain::TxIn::new(
            marmara_chain::OutPoint::new(TxId([1; 32]), 0),
            ScriptSig::Normal(pk(3)),
        );
        tx.inputs = vec![vin; ctx().rules.max_vins + 1];
        assert_eq!(
            validate_tx(&ctx(), &EmptyChain, &tx),
            Err(ValidationError::Invalid("too many vins".into()))
        );
    }
}
