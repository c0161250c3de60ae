//! Issue/transfer validation and loop-traversal tests.

use crate::generators::{next_nonce, test_pk};
use crate::harness::*;
use marmara_chain::{
    OutPoint, PubKey, ScriptPubKey, ScriptSig, Transaction, TxIn, TxOut,
};
use marmara_consensus::params::{BATON_AMOUNT, MARMARA_EVAL, MODULE_PUBKEY};
use marmara_consensus::{
    latest_baton, validate_tx, ActivatedKind, MarmaraOpret, ValidationContext, ValidationError,
};

fn ctx(chain: &MockChain) -> ValidationContext {
    ValidationContext::at_tip(chain, true)
}

fn assert_rule_msg(verdict: Result<(), ValidationError>, needle: &str) {
    match verdict {
        Err(ValidationError::Rule(msg)) => {
            assert!(msg.contains(needle), "unexpected rule message: {msg}")
        }
        other => panic!("expected rule violation containing {needle:?}, got {other:?}"),
    }
}

fn assert_invalid_msg(verdict: Result<(), ValidationError>, needle: &str) {
    match verdict {
        Err(ValidationError::Invalid(msg)) => {
            assert!(msg.contains(needle), "unexpected invalid message: {msg}")
        }
        other => panic!("expected invalid verdict containing {needle:?}, got {other:?}"),
    }
}

// ============ Issue Validation ============

#[test]
fn test_issue_tx_accepted() {
    let chain = MockChain::new();
    let issuer = test_pk(0x0A);
    let holder = test_pk(0x0B);
    let create = build_create(&chain, &holder, &issuer, 1_000_000, chain.height() + 10);
    let issue = make_issue(&chain, &issuer, &holder, create, 1_000_000);
    assert_eq!(validate_tx(&ctx(&chain), &chain, &issue), Ok(()));
}

#[test]
fn test_transfer_tx_accepted() {
    let fixture = issued_loop(MockChain::new(), 1_000_000, 100);
    let endorser = fixture.holder();
    let transfer = make_transfer(
        &fixture.chain,
        &endorser,
        &test_pk(0x0C),
        fixture.create_txid,
        fixture.baton_txid,
    );
    assert_eq!(validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer), Ok(()));
}

#[test]
fn test_second_transfer_accepted() {
    // two prior endorsers: redistribution to both must check out
    let fixture = transferred_loop(MockChain::new(), 900_000, 100, 1);
    let endorser = fixture.holder();
    let transfer = make_transfer(
        &fixture.chain,
        &endorser,
        &test_pk(0x1C),
        fixture.create_txid,
        fixture.baton_txid,
    );
    assert_eq!(validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer), Ok(()));
}

#[test]
fn test_self_credit_rejected() {
    let chain = MockChain::new();
    let party = test_pk(0x0A);
    // the same key creates the loop and issues against it
    let create = build_create(&chain, &party, &party, 1_000_000, chain.height() + 10);
    let issue = make_issue(&chain, &party, &party, create, 1_000_000);
    assert_invalid_msg(
        validate_tx(&ctx(&chain), &chain, &issue),
        "sender pk signed request tx",
    );
}

#[test]
fn test_issue_with_past_maturity_rejected() {
    let chain = MockChain::new();
    let issuer = test_pk(0x0A);
    let holder = test_pk(0x0B);
    let create = build_create(&chain, &holder, &issuer, 1_000_000, chain.height() - 1);
    let issue = make_issue(&chain, &issuer, &holder, create, 1_000_000);
    assert_rule_msg(
        validate_tx(&ctx(&chain), &chain, &issue),
        "credit loop must mature in the future",
    );
}

#[test]
fn test_tampered_share_rejected() {
    // three locked vouts each 2x tolerance above the fair share
    let fixture = transferred_loop(MockChain::new(), 1_000_000, 100, 1);
    let endorser = fixture.holder();
    let receiver = test_pk(0x1D);
    let request = build_request(&fixture.chain, &receiver, &endorser, fixture.create_txid);
    let share = 1_000_000 / 3;
    let transfer = make_transfer_with_shares(
        &fixture.chain,
        &endorser,
        &receiver,
        fixture.create_txid,
        fixture.baton_txid,
        request,
        &[share + 200, share + 200, share + 200],
        &[share, share],
    );
    assert_rule_msg(
        validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer),
        "MARMARA_LOCKED cc output amount incorrect",
    );
}

#[test]
fn test_endorser_set_tamper_rejected() {
    let fixture = transferred_loop(MockChain::new(), 900_000, 100, 1);
    let endorser = fixture.holder();
    let mut transfer = make_transfer(
        &fixture.chain,
        &endorser,
        &test_pk(0x1E),
        fixture.create_txid,
        fixture.baton_txid,
    );
    // swap the oldest prior endorser's locked vout and payout for a
    // stranger's, leaving all the amounts intact
    let stranger = test_pk(0x77);
    let raw = MarmaraOpret::Locked {
        create_txid: fixture.create_txid,
        pk: stranger,
    }
    .encode();
    let loop_pk = PubKey::from_txid(&fixture.create_txid);
    transfer.outputs[3] = TxOut::new(
        transfer.outputs[3].value,
        ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, loop_pk, Some(raw)),
    );
    transfer.outputs[5] = TxOut::new(transfer.outputs[5].value, ScriptPubKey::p2pk(stranger));
    assert_rule_msg(
        validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer),
        "issue/transfer tx has incorrect loop pubkeys",
    );
}

#[test]
fn test_missing_redistribution_rejected() {
    let fixture = issued_loop(MockChain::new(), 1_000_000, 100);
    let endorser = fixture.holder();
    let mut transfer = make_transfer(
        &fixture.chain,
        &endorser,
        &test_pk(0x1F),
        fixture.create_txid,
        fixture.baton_txid,
    );
    // drop the payout vout owed to the prior endorser
    transfer
        .outputs
        .retain(|out| out.script.p2pk_pubkey().is_none());
    assert_rule_msg(
        validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer),
        "invalid redistribution to normal outputs",
    );
}

#[test]
fn test_wrong_payout_amount_rejected() {
    let fixture = issued_loop(MockChain::new(), 1_000_000, 100);
    let endorser = fixture.holder();
    let receiver = test_pk(0x2A);
    let request = build_request(&fixture.chain, &receiver, &endorser, fixture.create_txid);
    let share = 1_000_000 / 2;
    let transfer = make_transfer_with_shares(
        &fixture.chain,
        &endorser,
        &receiver,
        fixture.create_txid,
        fixture.baton_txid,
        request,
        &[share, share],
        &[share - 5_000],
    );
    assert_rule_msg(
        validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer),
        "normal output amount incorrect",
    );
}

#[test]
fn test_transfer_without_baton_vin_rejected() {
    let fixture = issued_loop(MockChain::new(), 1_000_000, 100);
    let endorser = fixture.holder();
    let mut transfer = make_transfer(
        &fixture.chain,
        &endorser,
        &test_pk(0x2B),
        fixture.create_txid,
        fixture.baton_txid,
    );
    // keep only the activated run and the request vin
    transfer.inputs.truncate(2);
    assert_rule_msg(
        validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer),
        "no baton vin in transfer tx",
    );
}

#[test]
fn test_unconfirmed_request_rejected() {
    let fixture = issued_loop(MockChain::new(), 1_000_000, 100);
    let endorser = fixture.holder();
    let receiver = test_pk(0x2C);
    // hand-rolled request left in the mempool
    let funding = fund_normal(&fixture.chain, &receiver, 30_000);
    let request = fixture.chain.add_unconfirmed(Transaction {
        inputs: vec![TxIn::new(funding, ScriptSig::Normal(receiver))],
        outputs: vec![
            TxOut::new(BATON_AMOUNT, ScriptPubKey::cc1(MARMARA_EVAL, endorser, None)),
            TxOut::new(
                0,
                ScriptPubKey::op_return(
                    MarmaraOpret::Request {
                        create_txid: fixture.create_txid,
                        pk: endorser,
                    }
                    .encode(),
                ),
            ),
        ],
        coinbase: false,
        nonce: next_nonce(),
    });
    let share = 1_000_000 / 2;
    let transfer = make_transfer_with_shares(
        &fixture.chain,
        &endorser,
        &receiver,
        fixture.create_txid,
        fixture.baton_txid,
        request,
        &[share, share],
        &[share],
    );
    assert_invalid_msg(
        validate_tx(&ctx(&fixture.chain), &fixture.chain, &transfer),
        "request tx could be in mempool",
    );
}

// ============ Pool Validation ============

fn coinbase_tx(owner: PubKey, unlock_height: i32) -> Transaction {
    let opret = MarmaraOpret::Activated {
        kind: ActivatedKind::Coinbase,
        pk: owner,
        height: 10,
        unlock_height,
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
        nonce: next_nonce(),
    }
}

fn pool_tx(owner: PubKey, unlock_height: i32, vin_txid: marmara_chain::TxId) -> Transaction {
    let opret = MarmaraOpret::Activated {
        kind: ActivatedKind::Pool,
        pk: owner,
        height: 12,
        unlock_height,
    };
    Transaction {
        inputs: vec![TxIn::new(
            OutPoint::new(vin_txid, 0),
            ScriptSig::Cc {
                eval: MARMARA_EVAL,
                signer: owner,
            },
        )],
        outputs: vec![
            TxOut::new(
                1_000_000,
                ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, owner, Some(opret.encode())),
            ),
            TxOut::new(0, ScriptPubKey::op_return(opret.encode())),
        ],
        coinbase: false,
        nonce: next_nonce(),
    }
}

#[test]
fn test_pool_tx_accepted() {
    let chain = MockChain::new();
    let owner = test_pk(0x30);
    let cb = chain.add_confirmed(coinbase_tx(owner, 400));
    let pool = pool_tx(owner, 400, cb);
    assert_eq!(validate_tx(&ctx(&chain), &chain, &pool), Ok(()));
}

#[test]
fn test_pool_tx_unlock_height_mismatch_rejected() {
    let chain = MockChain::new();
    let owner = test_pk(0x30);
    let cb = chain.add_confirmed(coinbase_tx(owner, 400));
    let pool = pool_tx(owner, 500, cb);
    assert_invalid_msg(validate_tx(&ctx(&chain), &chain, &pool), "mismatched opreturn");
}

#[test]
fn test_pool_tx_noncoinbase_vin_rejected() {
    let chain = MockChain::new();
    let owner = test_pk(0x30);
    let mut not_cb = coinbase_tx(owner, 400);
    not_cb.coinbase = false;
    let vin_txid = chain.add_confirmed(not_cb);
    let pool = pool_tx(owner, 400, vin_txid);
    assert_invalid_msg(validate_tx(&ctx(&chain), &chain, &pool), "noncoinbase input");
}

// ============ Loop Traversal ============

#[test]
fn test_latest_baton_walk() {
    let fixture = transferred_loop(MockChain::new(), 900_000, 100, 2);
    let found = latest_baton(&fixture.chain, &fixture.create_txid)
        .unwrap()
        .unwrap();
    assert_eq!(found.baton_txid, fixture.baton_txid);
    assert_eq!(found.create_txid(), fixture.create_txid);
    // creation, issue and the first transfer are all spent links
    assert_eq!(found.endorser_count(), 3);
    assert!(!found.false_baton);
}

#[test]
fn test_latest_baton_from_any_loop_tx() {
    let fixture = transferred_loop(MockChain::new(), 900_000, 100, 1);
    let via_issue = latest_baton(&fixture.chain, &fixture.issue_txid)
        .unwrap()
        .unwrap();
    assert_eq!(via_issue.baton_txid, fixture.baton_txid);
}

#[test]
fn test_empty_loop() {
    let chain = MockChain::new();
    let create = build_create(&chain, &test_pk(1), &test_pk(2), 500_000, chain.height() + 5);
    assert_eq!(latest_baton(&chain, &create).unwrap(), None);
}

#[test]
fn test_false_baton_flagged() {
    let fixture = issued_loop(MockChain::new(), 1_000_000, 100);
    // someone spends the live baton into a vout with a wrong baton value
    let odd_spender = fixture.chain.add_confirmed(Transaction {
        inputs: vec![TxIn::new(
            OutPoint::new(fixture.baton_txid, 0),
            ScriptSig::Cc {
                eval: MARMARA_EVAL,
                signer: fixture.holder(),
            },
        )],
        outputs: vec![TxOut::new(
            7_777,
            ScriptPubKey::cc1(MARMARA_EVAL, fixture.holder(), None),
        )],
        coinbase: false,
        nonce: next_nonce(),
    });
    let found = latest_baton(&fixture.chain, &fixture.create_txid)
        .unwrap()
        .unwrap();
    assert_eq!(found.baton_txid, odd_spender);
    assert!(found.false_baton);
}
