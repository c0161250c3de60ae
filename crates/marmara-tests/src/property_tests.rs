//! Property-based tests for the module's universal invariants.

use crate::generators::test_pk;
use crate::harness::*;
use marmara_chain::{ChainView, PubKey, TxId};
use marmara_consensus::params::{BATON_AMOUNT, LOOP_TOLERANCE, MARMARA_EVAL, MODULE_PUBKEY};
use marmara_consensus::{
    activated_pubkey, locked_in_loop_pubkey, validate_tx, ActivatedKind, IssuerParams,
    MarmaraOpret, ValidationContext, ValidationError,
};
use proptest::prelude::*;

// ============================================================================
// Proptest Strategies
// ============================================================================

fn arb_pubkey() -> impl Strategy<Value = PubKey> {
    prop::array::uniform32(any::<u8>()).prop_map(|bytes| {
        let mut pk = [0u8; 33];
        pk[0] = 0x02;
        pk[1..].copy_from_slice(&bytes);
        PubKey(pk)
    })
}

fn arb_txid() -> impl Strategy<Value = TxId> {
    prop::array::uniform32(any::<u8>()).prop_map(TxId)
}

fn arb_amount() -> impl Strategy<Value = i64> {
    0i64..=1_000_000_000_000_000
}

fn arb_height() -> impl Strategy<Value = i32> {
    0i32..=i32::MAX - 1
}

fn arb_activated_kind() -> impl Strategy<Value = ActivatedKind> {
    prop_oneof![
        Just(ActivatedKind::Coinbase),
        Just(ActivatedKind::Coinbase3x),
        Just(ActivatedKind::Activated),
        Just(ActivatedKind::ActivatedInitial),
        Just(ActivatedKind::Pool),
    ]
}

fn arb_issuer_params() -> impl Strategy<Value = IssuerParams> {
    (
        any::<bool>(),
        any::<bool>(),
        0i32..=1_000,
        arb_height(),
        any::<bool>(),
        arb_amount(),
    )
        .prop_map(
            |(auto_settlement, auto_insurance, aval_count, dispute, escrow_on, blockage)| {
                IssuerParams {
                    auto_settlement,
                    auto_insurance,
                    aval_count,
                    dispute_expires_height: dispute,
                    escrow_on,
                    blockage_amount: blockage,
                }
            },
        )
}

fn arb_opret() -> impl Strategy<Value = MarmaraOpret> {
    prop_oneof![
        (arb_activated_kind(), arb_pubkey(), arb_height(), arb_height()).prop_map(
            |(kind, pk, height, unlock_height)| MarmaraOpret::Activated {
                kind,
                pk,
                height,
                unlock_height,
            }
        ),
        (arb_pubkey(), arb_amount(), arb_height(), "[A-Z]{0,10}").prop_map(
            |(pk, amount, matures, currency)| MarmaraOpret::Create {
                pk,
                amount,
                matures,
                currency,
            }
        ),
        (arb_txid(), arb_pubkey())
            .prop_map(|(create_txid, pk)| MarmaraOpret::Request { create_txid, pk }),
        (arb_txid(), arb_pubkey(), arb_issuer_params()).prop_map(|(create_txid, pk, params)| {
            MarmaraOpret::Issue {
                create_txid,
                pk,
                params,
            }
        }),
        (arb_txid(), arb_pubkey(), 0i32..=1_000).prop_map(|(create_txid, pk, aval_count)| {
            MarmaraOpret::Transfer {
                create_txid,
                pk,
                aval_count,
            }
        }),
        (arb_txid(), arb_pubkey())
            .prop_map(|(create_txid, pk)| MarmaraOpret::Locked { create_txid, pk }),
        (arb_txid(), arb_pubkey()).prop_map(|(create_txid, pk)| MarmaraOpret::Settle {
            create_txid,
            pk,
            remaining: 0,
        }),
        (arb_txid(), arb_pubkey(), 1i64..=1_000_000_000).prop_map(
            |(create_txid, pk, remaining)| MarmaraOpret::SettlePartial {
                create_txid,
                pk,
                remaining,
            }
        ),
        Just(MarmaraOpret::Release),
        Just(MarmaraOpret::Loop),
    ]
}

proptest! {
    // opret round-trip is the identity for every valid opret
    #[test]
    fn prop_opret_round_trip(opret in arb_opret()) {
        let encoded = opret.encode();
        prop_assert_eq!(MarmaraOpret::decode(&encoded), Some(opret));
    }

    // decoding never panics on arbitrary bytes
    #[test]
    fn prop_decode_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = MarmaraOpret::decode(&bytes);
    }

    // decoding survives corruption of any single byte of a valid encoding
    #[test]
    fn prop_decode_survives_corruption(opret in arb_opret(), idx in 0usize..64, byte in any::<u8>()) {
        let mut encoded = opret.encode();
        let idx = idx % encoded.len();
        encoded[idx] = byte;
        let _ = MarmaraOpret::decode(&encoded);
    }
}

// ============================================================================
// Loop Invariants
// ============================================================================

/// Mass conservation and per-share bounds hold for every accepted transfer,
/// across loop sizes and awkward principals.
#[test]
fn test_mass_conservation_across_loop_sizes() {
    for (amount, transfers) in [
        (1_000_000i64, 1usize),
        (999_999, 2),
        (5_000_001, 3),
        (301_331, 2),
    ] {
        let fixture = transferred_loop(MockChain::new(), amount, 100, transfers);
        let n = transfers + 1;
        let locked = locked_vouts_of(&fixture.chain, &fixture.baton_txid);
        assert_eq!(locked.len(), n, "one locked vout per endorser");

        let total: i64 = locked.iter().map(|(_, _, v)| *v).sum();
        assert!(
            (amount - total).abs() <= (n as i64 + 1) * LOOP_TOLERANCE,
            "locked total {total} strays from principal {amount}"
        );
        let share = amount / n as i64;
        for (_, _, value) in &locked {
            assert!((value - share).abs() <= LOOP_TOLERANCE);
        }

        // and the next transfer still validates
        let next = make_transfer(
            &fixture.chain,
            &fixture.holder(),
            &test_pk(0x60),
            fixture.create_txid,
            fixture.baton_txid,
        );
        let ctx = ValidationContext::at_tip(&fixture.chain, true);
        assert_eq!(validate_tx(&ctx, &fixture.chain, &next), Ok(()));
    }
}

/// Each accepted transfer adds exactly one endorser.
#[test]
fn test_endorser_monotonicity() {
    let fixture = issued_loop(MockChain::new(), 1_200_000, 100);
    let mut baton = fixture.baton_txid;
    let mut prev_count = locked_vouts_of(&fixture.chain, &baton).len();
    assert_eq!(prev_count, 1);
    for step in 0..3 {
        let holder = current_holder(&fixture.chain, &baton);
        baton = build_transfer(
            &fixture.chain,
            &holder,
            &test_pk(0x50 + step),
            fixture.create_txid,
            baton,
        );
        let count = locked_vouts_of(&fixture.chain, &baton).len();
        assert_eq!(count, prev_count + 1);
        prev_count = count;
    }
}

fn current_holder(chain: &MockChain, baton_txid: &TxId) -> PubKey {
    let (tx, _) = chain.get_tx(baton_txid).expect("baton tx");
    match tx.tail_op_return().and_then(MarmaraOpret::decode) {
        Some(MarmaraOpret::Issue { pk, .. }) | Some(MarmaraOpret::Transfer { pk, .. }) => pk,
        other => panic!("baton tx has no holder opret: {other:?}"),
    }
}

/// No output ever classifies as both activated and locked-in-loop.
#[test]
fn test_classifier_orthogonality_over_fixture_loop() {
    let fixture = transferred_loop(MockChain::new(), 1_000_000, 100, 2);
    let chain = &fixture.chain;
    for txid in [fixture.create_txid, fixture.issue_txid, fixture.baton_txid] {
        let (tx, _) = chain.get_tx(&txid).unwrap();
        for nvout in 0..tx.outputs.len() {
            let both = activated_pubkey(&tx, nvout).is_some()
                && locked_in_loop_pubkey(&tx, nvout).is_some();
            assert!(!both, "vout {nvout} of {txid} classifies as both");
        }
    }
}

/// The module key can never sign an accepted issue.
#[test]
fn test_module_key_cannot_sign() {
    let chain = MockChain::new();
    let issuer = test_pk(0x0A);
    let holder = test_pk(0x0B);
    let create = build_create(&chain, &holder, &issuer, 1_000_000, chain.height() + 10);
    let mut issue = make_issue(&chain, &issuer, &holder, create, 1_000_000);
    issue.inputs[0].script_sig = marmara_chain::ScriptSig::Cc {
        eval: MARMARA_EVAL,
        signer: MODULE_PUBKEY,
    };
    let ctx = ValidationContext::at_tip(&chain, true);
    assert!(matches!(
        validate_tx(&ctx, &chain, &issue),
        Err(ValidationError::Rule(msg)) if msg.contains("marmara global pubkey")
    ));
}

/// At any point in a loop's life exactly one baton vout is unspent.
#[test]
fn test_baton_uniqueness() {
    let fixture = transferred_loop(MockChain::new(), 1_000_000, 100, 3);
    let chain = &fixture.chain;
    let loop_txids = {
        let found = marmara_consensus::latest_baton(chain, &fixture.create_txid)
            .unwrap()
            .unwrap();
        let mut txids = found.chain.clone();
        txids.push(found.baton_txid);
        txids
    };
    let live: Vec<&TxId> = loop_txids
        .iter()
        .filter(|txid| chain.utxo_value(txid, 0).is_some())
        .collect();
    assert_eq!(live.len(), 1, "exactly one live baton");
    assert_eq!(*live[0], fixture.baton_txid);
    // and the live one carries the fixed baton value
    assert_eq!(chain.utxo_value(live[0], 0), Some(BATON_AMOUNT));
}
