//! Output classification.
//!
//! Two predicates decide what a Marmara output *is*: activated coins (stake
//! weighted, owned by one pubkey) or locked-in-loop coins (collateral co-owned
//! with the per-loop key). Both resolve the opret from its two possible
//! carrying sites, then insist the output's script is exactly the 1-of-2
//! template the opret implies.

use crate::params::{MARMARA_EVAL, MODULE_PUBKEY};
use crate::{MarmaraOpret, OpretCarrier};
use marmara_chain::{PubKey, ScriptPubKey, Transaction};
use tracing::debug;

/// Which opret family a lookup is after.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpretKind {
    /// Activated-coin oprets (func ids C, E, A, N, P).
    Activated,
    /// Credit-loop oprets (every non-activated func id).
    Loop,
}

/// Carrier policy plus opret family for a lookup.
///
/// Activated checks only ever look at the crypto-condition data blob;
/// loop checks may fall back to the transaction's trailing OP_RETURN. Both
/// policies are consensus rules, not conveniences.
#[derive(Clone, Copy, Debug)]
pub struct OpretChecker {
    cc_only: bool,
    kind: OpretKind,
}

impl OpretChecker {
    /// Checker for activated-coin oprets (cc carrier only).
    pub fn activated() -> Self {
        Self {
            cc_only: true,
            kind: OpretKind::Activated,
        }
    }

    /// Checker for loop oprets, either carrier.
    pub fn lock_in_loop() -> Self {
        Self {
            cc_only: false,
            kind: OpretKind::Loop,
        }
    }

    /// Checker for loop oprets restricted to the cc carrier (stake txns put
    /// PoS data in the last vout, so only the cc site is trustworthy there).
    pub fn lock_in_loop_cc_only() -> Self {
        Self {
            cc_only: true,
            kind: OpretKind::Loop,
        }
    }

    fn accepts(&self, opret: &MarmaraOpret) -> bool {
        match self.kind {
            OpretKind::Activated => matches!(opret, MarmaraOpret::Activated { .. }),
            OpretKind::Loop => !matches!(opret, MarmaraOpret::Activated { .. }),
        }
    }
}

/// Resolve the opret for a vout: the crypto-condition data blob first, then
/// (unless the checker is cc-only, and never for the trailing vout itself)
/// the transaction's last-vout OP_RETURN.
///
/// Returns the decoded opret, which carrier supplied it, and the raw carrier
/// bytes.
pub fn vout_opret<'a>(
    tx: &'a Transaction,
    nvout: usize,
    checker: &OpretChecker,
) -> Option<(MarmaraOpret, OpretCarrier, &'a [u8])> {
    let vout = tx.outputs.get(nvout)?;

    if let Some(raw) = vout.script.cc_data() {
        if let Some(opret) = MarmaraOpret::decode(raw) {
            if checker.accepts(&opret) {
                return Some((opret, OpretCarrier::CcData, raw));
            }
        }
    }

    if !checker.cc_only && nvout + 1 < tx.outputs.len() {
        if let Some(raw) = tx.tail_op_return() {
            if let Some(opret) = MarmaraOpret::decode(raw) {
                if checker.accepts(&opret) {
                    return Some((opret, OpretCarrier::LastVout, raw));
                }
            }
        }
    }

    None
}

/// Expected script for an output carrying the given opret: the 1-of-2 of the
/// module key and the opret-implied key, with the opret bytes embedded.
///
/// The reconstruction always embeds the opret, so a vout whose opret was only
/// found at the trailing OP_RETURN matches solely when the vout itself also
/// embeds those bytes. The fallback site still feeds the func-id scan.
fn expected_cc_script(value_pk: PubKey, raw: &[u8]) -> ScriptPubKey {
    ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, value_pk, Some(raw.to_vec()))
}

/// Classify a vout as activated coins, returning the owner pubkey.
///
/// Requirements:
/// - a C/E/A/N/P opret in the vout's cc data blob
/// - the vout script equals the 1-of-2 of the module key and the opret owner
///
/// Activated outputs may be funded from any normal inputs (self-funding);
/// the earlier rule requiring marmara cc funding is deliberately relaxed.
pub fn activated_pubkey(tx: &Transaction, nvout: usize) -> Option<PubKey> {
    let (opret, _, raw) = vout_opret(tx, nvout, &OpretChecker::activated())?;
    let pk = *opret.pubkey()?;
    let expected = expected_cc_script(pk, raw);
    if tx.outputs[nvout].script != expected {
        debug!(tx_id = %tx.txid(), nvout, "pubkey in opreturn does not match vout");
        return None;
    }
    Some(pk)
}

/// Classify a vout as locked-in-loop coins, returning the endorser pubkey.
///
/// Requirements:
/// - a K/I/T opret at either carrying site
/// - the vout script equals the 1-of-2 of the module key and the pubkey
///   derived from the loop's creation txid
/// - the transaction spends at least one marmara cc input (so the locked
///   value descends from previously validated coins, not a self-spend)
pub fn locked_in_loop_pubkey(tx: &Transaction, nvout: usize) -> Option<PubKey> {
    let (opret, _, raw) = vout_opret(tx, nvout, &OpretChecker::lock_in_loop())?;
    let (create_txid, pk) = match &opret {
        MarmaraOpret::Locked { create_txid, pk }
        | MarmaraOpret::Issue { create_txid, pk, .. }
        | MarmaraOpret::Transfer { create_txid, pk, .. } => (create_txid, *pk),
        _ => return None,
    };
    let expected = expected_cc_script(PubKey::from_txid(create_txid), raw);
    if tx.outputs[nvout].script != expected {
        debug!(tx_id = %tx.txid(), nvout, "pubkey in opreturn does not match vout");
        return None;
    }
    if !tx.has_cc_input(MARMARA_EVAL) {
        debug!(tx_id = %tx.txid(), "vintx has no marmara cc inputs");
        return None;
    }
    Some(pk)
}
