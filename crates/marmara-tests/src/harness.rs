//! Test harness: a mock chain and whole-loop fixture builders.

use crate::generators::{next_nonce, test_pk};
use marmara_chain::{
    Amount, BlockHash, ChainView, Height, MempoolView, OutPoint, PubKey, ScriptPubKey, ScriptSig,
    SpentInfo, Transaction, TxId, TxIn, TxOut,
};
use marmara_consensus::params::{
    BATON_AMOUNT, CREATETX_AMOUNT, CURRENCY, LOOP_MARKER_AMOUNT, MARMARA_EVAL, MODULE_PUBKEY,
    OPENCLOSE_VOUT, OPEN_MARKER_AMOUNT, V2_LOCK_HEIGHT,
};
use marmara_consensus::{
    locked_in_loop_pubkey, loop_creation_data, ActivatedKind, IssuerParams, MarmaraOpret,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Default fixture height; current consensus rules are in force here.
pub const DEFAULT_HEIGHT: Height = 200_000;

/// Default fixture tip time, past the June 2020 update.
pub const DEFAULT_TIMESTAMP: u32 = 1_600_000_000;

/// A fixture position at which the legacy rules still apply.
pub const LEGACY_HEIGHT: Height = 100_000;

/// A fixture tip time before the June 2020 update.
pub const LEGACY_TIMESTAMP: u32 = 1_560_000_000;

#[derive(Default)]
struct ChainInner {
    txs: HashMap<TxId, (Transaction, Option<BlockHash>)>,
    spends: HashMap<(TxId, u32), SpentInfo>,
    mempool_spends: HashMap<(TxId, u32), TxId>,
    height: Height,
    timestamp: u32,
}

/// In-memory chain implementing the ledger-view traits.
pub struct MockChain {
    inner: RwLock<ChainInner>,
}

impl MockChain {
    /// Chain positioned where the current rules apply.
    pub fn new() -> Self {
        Self::at_position(DEFAULT_HEIGHT, DEFAULT_TIMESTAMP)
    }

    /// Chain positioned where the legacy rules apply.
    pub fn legacy() -> Self {
        Self::at_position(LEGACY_HEIGHT, LEGACY_TIMESTAMP)
    }

    /// Chain at an arbitrary position.
    pub fn at_position(height: Height, timestamp: u32) -> Self {
        Self {
            inner: RwLock::new(ChainInner {
                height,
                timestamp,
                ..Default::default()
            }),
        }
    }

    /// Confirm a transaction: store it with a block hash and mark its inputs
    /// spent.
    pub fn add_confirmed(&self, tx: Transaction) -> TxId {
        let txid = tx.txid();
        let mut inner = self.inner.write();
        let height = inner.height;
        for (nvin, vin) in tx.inputs.iter().enumerate() {
            inner.spends.insert(
                (vin.prevout.txid, vin.prevout.vout),
                SpentInfo {
                    spender: txid,
                    vin: nvin as u32,
                    height,
                },
            );
        }
        inner.txs.insert(txid, (tx, Some(BlockHash(txid.0))));
        txid
    }

    /// Add a transaction to the mempool: known, unconfirmed, its spends only
    /// visible through the mempool view.
    pub fn add_unconfirmed(&self, tx: Transaction) -> TxId {
        let txid = tx.txid();
        let mut inner = self.inner.write();
        for vin in &tx.inputs {
            inner
                .mempool_spends
                .insert((vin.prevout.txid, vin.prevout.vout), txid);
        }
        inner.txs.insert(txid, (tx, None));
        txid
    }

    /// Forcibly mark an output spent by an arbitrary txid, without knowing
    /// the spender's contents. Used to simulate reorg damage.
    pub fn force_spend(&self, txid: TxId, vout: u32, spender: TxId) {
        let mut inner = self.inner.write();
        let height = inner.height;
        inner.spends.insert(
            (txid, vout),
            SpentInfo {
                spender,
                vin: 0,
                height,
            },
        );
    }

    /// Move the tip to the given height.
    pub fn set_height(&self, height: Height) {
        self.inner.write().height = height;
    }

    /// Advance the tip by the given number of blocks.
    pub fn advance(&self, blocks: Height) {
        self.inner.write().height += blocks;
    }

    /// Current tip height.
    pub fn height(&self) -> Height {
        self.inner.read().height
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainView for MockChain {
    fn get_tx(&self, txid: &TxId) -> Option<(Transaction, Option<BlockHash>)> {
        self.inner.read().txs.get(txid).cloned()
    }

    fn spent_of(&self, txid: &TxId, vout: u32) -> Option<SpentInfo> {
        self.inner.read().spends.get(&(*txid, vout)).copied()
    }

    fn utxo_value(&self, txid: &TxId, vout: u32) -> Option<Amount> {
        let inner = self.inner.read();
        if inner.spends.contains_key(&(*txid, vout)) {
            return None;
        }
        let (tx, _) = inner.txs.get(txid)?;
        tx.outputs.get(vout as usize).map(|out| out.value)
    }

    fn current_height(&self) -> Height {
        self.inner.read().height
    }

    fn latest_timestamp(&self) -> u32 {
        self.inner.read().timestamp
    }
}

impl MempoolView for MockChain {
    fn has_spender_of(&self, txid: &TxId, vout: u32) -> bool {
        self.inner.read().mempool_spends.contains_key(&(*txid, vout))
    }
}

// ============================================================================
// Fixture builders
// ============================================================================

fn cc_sig(signer: PubKey) -> ScriptSig {
    ScriptSig::Cc {
        eval: MARMARA_EVAL,
        signer,
    }
}

/// Confirm a normal P2PK funding output for `owner`.
pub fn fund_normal(chain: &MockChain, owner: &PubKey, value: Amount) -> OutPoint {
    let tx = Transaction {
        inputs: vec![],
        outputs: vec![TxOut::new(value, ScriptPubKey::p2pk(*owner))],
        coinbase: false,
        nonce: next_nonce(),
    };
    OutPoint::new(chain.add_confirmed(tx), 0)
}

/// Confirm an activated 1-of-2 output for `owner`.
pub fn fund_activated(chain: &MockChain, owner: &PubKey, value: Amount) -> OutPoint {
    let opret = MarmaraOpret::Activated {
        kind: ActivatedKind::Activated,
        pk: *owner,
        height: chain.height(),
        unlock_height: V2_LOCK_HEIGHT,
    };
    let tx = Transaction {
        inputs: vec![],
        outputs: vec![TxOut::new(
            value,
            ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, *owner, Some(opret.encode())),
        )],
        coinbase: false,
        nonce: next_nonce(),
    };
    OutPoint::new(chain.add_confirmed(tx), 0)
}

/// Confirm a creation tx: `receiver` asks `sender` for `amount` of credit
/// maturing at `matures`. Its vout 0 doubles as the request vin of the issue
/// and as the root of the baton chain.
pub fn build_create(
    chain: &MockChain,
    receiver: &PubKey,
    sender: &PubKey,
    amount: Amount,
    matures: Height,
) -> TxId {
    let funding = fund_normal(chain, receiver, 50_000);
    let opret = MarmaraOpret::Create {
        pk: *sender,
        amount,
        matures,
        currency: CURRENCY.to_string(),
    };
    let tx = Transaction {
        inputs: vec![TxIn::new(funding, ScriptSig::Normal(*receiver))],
        outputs: vec![
            TxOut::new(CREATETX_AMOUNT, ScriptPubKey::cc1(MARMARA_EVAL, *sender, None)),
            TxOut::new(
                LOOP_MARKER_AMOUNT,
                ScriptPubKey::cc1(MARMARA_EVAL, MODULE_PUBKEY, None),
            ),
            TxOut::new(0, ScriptPubKey::op_return(opret.encode())),
        ],
        coinbase: false,
        nonce: next_nonce(),
    };
    chain.add_confirmed(tx)
}

/// Confirm a request tx: `receiver` asks the current `holder` to transfer the
/// loop on.
pub fn build_request(
    chain: &MockChain,
    receiver: &PubKey,
    holder: &PubKey,
    create_txid: TxId,
) -> TxId {
    let funding = fund_normal(chain, receiver, 30_000);
    let opret = MarmaraOpret::Request {
        create_txid,
        pk: *holder,
    };
    let tx = Transaction {
        inputs: vec![TxIn::new(funding, ScriptSig::Normal(*receiver))],
        outputs: vec![
            TxOut::new(BATON_AMOUNT, ScriptPubKey::cc1(MARMARA_EVAL, *holder, None)),
            TxOut::new(0, ScriptPubKey::op_return(opret.encode())),
        ],
        coinbase: false,
        nonce: next_nonce(),
    };
    chain.add_confirmed(tx)
}

/// Assemble (without confirming) an issue tx: `issuer` locks `amount` into
/// the loop and hands the baton to `receiver`.
pub fn make_issue(
    chain: &MockChain,
    issuer: &PubKey,
    receiver: &PubKey,
    create_txid: TxId,
    amount: Amount,
) -> Transaction {
    let activated = fund_activated(chain, issuer, amount + 100_000);
    let loop_pk = PubKey::from_txid(&create_txid);
    let locked = MarmaraOpret::Locked {
        create_txid,
        pk: *issuer,
    };
    let opret = MarmaraOpret::Issue {
        create_txid,
        pk: *receiver,
        params: IssuerParams::default(),
    };
    Transaction {
        inputs: vec![
            TxIn::new(activated, cc_sig(*issuer)),
            TxIn::new(OutPoint::new(create_txid, 0), cc_sig(*issuer)),
        ],
        outputs: vec![
            TxOut::new(BATON_AMOUNT, ScriptPubKey::cc1(MARMARA_EVAL, *receiver, None)),
            TxOut::new(
                LOOP_MARKER_AMOUNT,
                ScriptPubKey::cc1(MARMARA_EVAL, MODULE_PUBKEY, None),
            ),
            TxOut::new(
                amount,
                ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, loop_pk, Some(locked.encode())),
            ),
            TxOut::new(
                OPEN_MARKER_AMOUNT,
                ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, loop_pk, None),
            ),
            TxOut::new(0, ScriptPubKey::op_return(opret.encode())),
        ],
        coinbase: false,
        nonce: next_nonce(),
    }
}

/// Confirm an issue tx.
pub fn build_issue(
    chain: &MockChain,
    issuer: &PubKey,
    receiver: &PubKey,
    create_txid: TxId,
    amount: Amount,
) -> TxId {
    chain.add_confirmed(make_issue(chain, issuer, receiver, create_txid, amount))
}

/// The locked vouts of a confirmed loop tx, in vout order.
pub fn locked_vouts_of(chain: &MockChain, txid: &TxId) -> Vec<(OutPoint, PubKey, Amount)> {
    let (tx, _) = chain.get_tx(txid).expect("loop tx in mock chain");
    let mut found = Vec::new();
    for nvout in 0..tx.outputs.len().saturating_sub(1) {
        if let Some(pk) = locked_in_loop_pubkey(&tx, nvout) {
            found.push((
                OutPoint::new(*txid, nvout as u32),
                pk,
                tx.outputs[nvout].value,
            ));
        }
    }
    found
}

/// Assemble (without confirming) a transfer tx with explicit share and
/// payout values.
///
/// `lcl_values` sets the new locked vouts, the new endorser's first;
/// `payouts` pays the prior endorsers in their baton-tx vout order. Both
/// lists let tests distort the arithmetic deliberately.
#[allow(clippy::too_many_arguments)]
pub fn make_transfer_with_shares(
    chain: &MockChain,
    new_endorser: &PubKey,
    receiver: &PubKey,
    create_txid: TxId,
    baton_txid: TxId,
    request_txid: TxId,
    lcl_values: &[Amount],
    payouts: &[Amount],
) -> Transaction {
    let prior = locked_vouts_of(chain, &baton_txid);
    assert_eq!(
        lcl_values.len(),
        prior.len() + 1,
        "one locked vout per prior endorser plus the new one"
    );
    assert_eq!(payouts.len(), prior.len());

    let total_payout: Amount = payouts.iter().sum();
    let activated = fund_activated(chain, new_endorser, total_payout + 100_000);
    let loop_pk = PubKey::from_txid(&create_txid);

    let mut inputs = vec![
        TxIn::new(activated, cc_sig(*new_endorser)),
        TxIn::new(OutPoint::new(request_txid, 0), cc_sig(*new_endorser)),
        TxIn::new(OutPoint::new(baton_txid, 0), cc_sig(*new_endorser)),
    ];
    for (outpoint, _, _) in &prior {
        inputs.push(TxIn::new(*outpoint, cc_sig(loop_pk)));
    }

    let mut outputs = vec![TxOut::new(
        BATON_AMOUNT,
        ScriptPubKey::cc1(MARMARA_EVAL, *receiver, None),
    )];
    let mut lcl_pks: Vec<PubKey> = vec![*new_endorser];
    lcl_pks.extend(prior.iter().map(|(_, pk, _)| *pk));
    for (pk, value) in lcl_pks.iter().zip(lcl_values) {
        let locked = MarmaraOpret::Locked {
            create_txid,
            pk: *pk,
        };
        outputs.push(TxOut::new(
            *value,
            ScriptPubKey::cc_1of2(MARMARA_EVAL, MODULE_PUBKEY, loop_pk, Some(locked.encode())),
        ));
    }
    for ((_, pk, _), value) in prior.iter().zip(payouts) {
        outputs.push(TxOut::new(*value, ScriptPubKey::p2pk(*pk)));
    }
    let opret = MarmaraOpret::Transfer {
        create_txid,
        pk: *receiver,
        aval_count: 0,
    };
    outputs.push(TxOut::new(0, ScriptPubKey::op_return(opret.encode())));

    Transaction {
        inputs,
        outputs,
        coinbase: false,
        nonce: next_nonce(),
    }
}

/// Assemble a well-formed transfer: equal shares of the principal, equal
/// payouts to every prior endorser. Creates the receiver's request tx too.
pub fn make_transfer(
    chain: &MockChain,
    new_endorser: &PubKey,
    receiver: &PubKey,
    create_txid: TxId,
    baton_txid: TxId,
) -> Transaction {
    let creation = loop_creation_data(chain, &create_txid).expect("creation data");
    let n_prev = locked_vouts_of(chain, &baton_txid).len();
    let share = creation.amount / (n_prev as Amount + 1);
    let request_txid = build_request(chain, receiver, new_endorser, create_txid);
    make_transfer_with_shares(
        chain,
        new_endorser,
        receiver,
        create_txid,
        baton_txid,
        request_txid,
        &vec![share; n_prev + 1],
        &vec![share; n_prev],
    )
}

/// Confirm a well-formed transfer.
pub fn build_transfer(
    chain: &MockChain,
    new_endorser: &PubKey,
    receiver: &PubKey,
    create_txid: TxId,
    baton_txid: TxId,
) -> TxId {
    chain.add_confirmed(make_transfer(
        chain,
        new_endorser,
        receiver,
        create_txid,
        baton_txid,
    ))
}

// ============================================================================
// Whole-loop fixtures
// ============================================================================

/// A fixture loop and the identities involved in it.
pub struct LoopFixture {
    pub chain: MockChain,
    /// The party that locked the principal in.
    pub issuer: PubKey,
    /// Successive receivers of the baton, oldest first.
    pub holders: Vec<PubKey>,
    pub create_txid: TxId,
    pub issue_txid: TxId,
    /// The latest issue/transfer tx.
    pub baton_txid: TxId,
    pub amount: Amount,
    pub matures: Height,
}

impl LoopFixture {
    /// The current holder.
    pub fn holder(&self) -> PubKey {
        *self.holders.last().expect("loop has a holder")
    }

    /// The open/close marker of this loop.
    pub fn open_close(&self) -> OutPoint {
        OutPoint::new(self.issue_txid, OPENCLOSE_VOUT)
    }
}

/// Create + issue: issuer locks `amount`, the first holder receives the
/// baton, maturing `matures_offset` blocks from the current tip.
pub fn issued_loop(chain: MockChain, amount: Amount, matures_offset: Height) -> LoopFixture {
    let issuer = test_pk(0x0A);
    let holder = test_pk(0x0B);
    let matures = chain.height() + matures_offset;
    let create_txid = build_create(&chain, &holder, &issuer, amount, matures);
    let issue_txid = build_issue(&chain, &issuer, &holder, create_txid, amount);
    LoopFixture {
        chain,
        issuer,
        holders: vec![holder],
        create_txid,
        issue_txid,
        baton_txid: issue_txid,
        amount,
        matures,
    }
}

/// An issued loop extended by `n_transfers` well-formed transfers.
pub fn transferred_loop(
    chain: MockChain,
    amount: Amount,
    matures_offset: Height,
    n_transfers: usize,
) -> LoopFixture {
    let mut fixture = issued_loop(chain, amount, matures_offset);
    for step in 0..n_transfers {
        let receiver = test_pk(0x0C + step as u8);
        let endorser = fixture.holder();
        fixture.baton_txid = build_transfer(
            &fixture.chain,
            &endorser,
            &receiver,
            fixture.create_txid,
            fixture.baton_txid,
        );
        fixture.holders.push(receiver);
    }
    fixture
}
