//! Locking normal coins into activated coins.

use crate::{TxBuildError, TxBuildResult};
use marmara_consensus::params::{
    ACTIVATED_MARKER_AMOUNT, MARMARA_EVAL, MODULE_PUBKEY, V2_LOCK_HEIGHT,
};
use marmara_consensus::{ActivatedKind, MarmaraOpret};
use marmara_chain::{
    Amount, Height, OutPoint, PubKey, ScriptPubKey, ScriptSig, Transaction, TxOut, TxIn,
};
use tracing::debug;

/// Build a transaction locking `amount` of the owner's normal funds into an
/// activated 1-of-2 output.
///
/// `funding` lists normal UTXOs the owner controls; inputs are selected
/// front-to-back until the amount plus the activated marker is covered.
/// The unlock height is pinned to the lock-to-even sentinel, matching how
/// staking rewards stay activated.
pub fn build_lock(
    owner: &PubKey,
    amount: Amount,
    height: Height,
    funding: &[(OutPoint, Amount)],
) -> TxBuildResult<Transaction> {
    if amount <= 0 {
        return Err(TxBuildError::InvalidAmount(amount));
    }
    let needed = amount + ACTIVATED_MARKER_AMOUNT;

    let mut inputs = Vec::new();
    let mut funded: Amount = 0;
    for (outpoint, value) in funding {
        if funded >= needed {
            break;
        }
        inputs.push(TxIn::new(*outpoint, ScriptSig::Normal(*owner)));
        funded += value;
    }
    if funded < needed {
        return Err(TxBuildError::InsufficientFunds {
            needed,
            available: funded,
        });
    }

    let opret = MarmaraOpret::Activated {
        kind: ActivatedKind::Activated,
        pk: *owner,
        height,
        unlock_height: V2_LOCK_HEIGHT,
    };

    let mut outputs = vec![
        TxOut::new(
            amount,
            ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, *owner, Some(opret.encode())),
        ),
        // marker making the activated address discoverable
        TxOut::new(
            ACTIVATED_MARKER_AMOUNT,
            ScriptPubKey::cc1(MARMARA_EVAL, MODULE_PUBKEY, None),
        ),
    ];
    let change = funded - needed;
    if change > 0 {
        outputs.push(TxOut::new(change, ScriptPubKey::p2pk(*owner)));
    }

    let tx = Transaction {
        inputs,
        outputs,
        coinbase: false,
        nonce: 0,
    };
    debug!(tx_id = %tx.txid(), amount, funded, "assembled activated lock tx");
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marmara_consensus::activated_pubkey;
    use marmara_chain::TxId;

    fn pk(seed: u8) -> PubKey {
        let mut bytes = [seed; 33];
        bytes[0] = 0x02;
        PubKey(bytes)
    }

    fn funding(values: &[Amount]) -> Vec<(OutPoint, Amount)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (OutPoint::new(TxId([i as u8 + 1; 32]), 0), *v))
            .collect()
    }

    #[test]
    fn test_lock_produces_activated_vout() {
        let owner = pk(1);
        let tx = build_lock(&owner, 1_000_000, 50, &funding(&[2_000_000])).unwrap();
        assert_eq!(activated_pubkey(&tx, 0), Some(owner));
        assert_eq!(tx.outputs[0].value, 1_000_000);
        assert_eq!(tx.outputs[1].value, ACTIVATED_MARKER_AMOUNT);
        // change back to the owner
        assert_eq!(
            tx.outputs[2].script.p2pk_pubkey(),
            Some(&owner),
        );
        assert_eq!(tx.outputs[2].value, 2_000_000 - 1_000_000 - ACTIVATED_MARKER_AMOUNT);
    }

    #[test]
    fn test_lock_selects_multiple_inputs() {
        let owner = pk(1);
        let tx = build_lock(&owner, 1_500_000, 50, &funding(&[1_000_000, 600_000])).unwrap();
        assert_eq!(tx.inputs.len(), 2);
    }

    #[test]
    fn test_lock_rejects_insufficient_funds() {
        let owner = pk(1);
        assert!(matches!(
            build_lock(&owner, 5_000_000, 50, &funding(&[1_000_000])),
            Err(TxBuildError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_lock_rejects_nonpositive_amount() {
        let owner = pk(1);
        assert!(matches!(
            build_lock(&owner, 0, 50, &funding(&[1_000_000])),
            Err(TxBuildError::InvalidAmount(0))
        ));
    }
}
