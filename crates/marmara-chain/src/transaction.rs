//! The transaction model consensus code validates against.

use crate::{Amount, ScriptPubKey, ScriptSig, TxId};
use blake2::{digest::Digest, Blake2b};
use serde::{Deserialize, Serialize};

type Blake2b256 = Blake2b<blake2::digest::consts::U32>;

/// Reference to a previous transaction output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct OutPoint {
    /// The funding transaction.
    pub txid: TxId,
    /// The output index within it.
    pub vout: u32,
}

impl OutPoint {
    /// Create a new outpoint.
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

/// A transaction input.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TxIn {
    /// The output being spent.
    pub prevout: OutPoint,
    /// Structural unlocking script.
    pub script_sig: ScriptSig,
}

impl TxIn {
    /// Create a new input.
    pub fn new(prevout: OutPoint, script_sig: ScriptSig) -> Self {
        Self { prevout, script_sig }
    }
}

/// A transaction output.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TxOut {
    /// Value in base units.
    pub value: Amount,
    /// Locking script.
    pub script: ScriptPubKey,
}

impl TxOut {
    /// Create a new output.
    pub fn new(value: Amount, script: ScriptPubKey) -> Self {
        Self { value, script }
    }
}

/// A transaction.
///
/// Signatures are assumed checked by the host before Marmara validation runs;
/// only structure, values and signer identities are modelled here.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Inputs, in declared order. Empty for a coinbase.
    pub inputs: Vec<TxIn>,
    /// Outputs, in declared order.
    pub outputs: Vec<TxOut>,
    /// Whether this is the block's coinbase transaction.
    pub coinbase: bool,
    /// Extra entropy for otherwise-identical transactions (the host encodes
    /// the block height into its coinbases the same way).
    pub nonce: u64,
}

impl Transaction {
    /// Transaction id: Blake2b-256 over the canonical field encoding.
    pub fn txid(&self) -> TxId {
        let mut buf = Vec::with_capacity(64 + self.inputs.len() * 70 + self.outputs.len() * 80);
        buf.push(self.coinbase as u8);
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(input.prevout.txid.as_bytes());
            buf.extend_from_slice(&input.prevout.vout.to_le_bytes());
            input.script_sig.write_digest_bytes(&mut buf);
        }
        buf.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            output.script.write_digest_bytes(&mut buf);
        }
        let digest = Blake2b256::digest(&buf);
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        TxId(id)
    }

    /// The trailing OP_RETURN payload, if the last vout carries one.
    pub fn tail_op_return(&self) -> Option<&[u8]> {
        self.outputs.last()?.script.op_return_data()
    }

    /// Whether any input is a crypto-condition spend under the given eval code.
    pub fn has_cc_input(&self, eval: u8) -> bool {
        self.inputs.iter().any(|vin| vin.script_sig.is_cc_for(eval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PubKey;

    fn sample_tx(nonce: u64) -> Transaction {
        Transaction {
            inputs: vec![TxIn::new(
                OutPoint::new(TxId([1u8; 32]), 0),
                ScriptSig::Normal(PubKey([2u8; 33])),
            )],
            outputs: vec![TxOut::new(500, ScriptPubKey::p2pk(PubKey([3u8; 33])))],
            coinbase: false,
            nonce,
        }
    }

    #[test]
    fn test_txid_is_deterministic() {
        assert_eq!(sample_tx(1).txid(), sample_tx(1).txid());
    }

    #[test]
    fn test_txid_depends_on_contents() {
        assert_ne!(sample_tx(1).txid(), sample_tx(2).txid());

        let mut tweaked = sample_tx(1);
        tweaked.outputs[0].value = 501;
        assert_ne!(sample_tx(1).txid(), tweaked.txid());
    }

    #[test]
    fn test_tail_op_return() {
        let mut tx = sample_tx(1);
        assert_eq!(tx.tail_op_return(), None);

        tx.outputs
            .push(TxOut::new(0, ScriptPubKey::op_return(vec![0xef, b'B', 1])));
        assert_eq!(tx.tail_op_return(), Some(&[0xef, b'B', 1][..]));
    }

    #[test]
    fn test_has_cc_input() {
        let mut tx = sample_tx(1);
        assert!(!tx.has_cc_input(0xef));

        tx.inputs.push(TxIn::new(
            OutPoint::new(TxId([9u8; 32]), 1),
            ScriptSig::Cc {
                eval: 0xef,
                signer: PubKey([4u8; 33]),
            },
        ));
        assert!(tx.has_cc_input(0xef));
        assert!(!tx.has_cc_input(0xe4));
    }
}
