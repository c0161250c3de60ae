//! Structural script templates.
//!
//! Marmara consensus never interprets script opcodes; it only needs to
//! recognise a handful of fixed templates and compare them for equality.
//! The crypto-condition interpreter that actually enforces the 1-of-2
//! spending conditions is part of the host daemon.

use crate::PubKey;
use blake2::{digest::Digest, Blake2b};
use serde::{Deserialize, Serialize};

type Blake2b256 = Blake2b<blake2::digest::consts::U32>;

/// An output locking script, reduced to the templates Marmara uses.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ScriptPubKey {
    /// Normal pay-to-pubkey output (`<pk> OP_CHECKSIG`).
    P2pk(PubKey),

    /// Crypto-condition output spendable by a single key under an eval code,
    /// optionally carrying an embedded data blob.
    Cc1 {
        eval: u8,
        pk: PubKey,
        data: Option<Vec<u8>>,
    },

    /// 1-of-2 crypto-condition output under an eval code, optionally carrying
    /// an embedded data blob. Marmara's activated and locked-in-loop coins
    /// both use this shape.
    Cc1of2 {
        eval: u8,
        pk1: PubKey,
        pk2: PubKey,
        data: Option<Vec<u8>>,
    },

    /// Trailing OP_RETURN data carrier.
    OpReturn(Vec<u8>),
}

impl ScriptPubKey {
    /// Normal payout template for a pubkey.
    pub fn p2pk(pk: PubKey) -> Self {
        ScriptPubKey::P2pk(pk)
    }

    /// Single-key crypto-condition vout.
    pub fn cc1(eval: u8, pk: PubKey, data: Option<Vec<u8>>) -> Self {
        ScriptPubKey::Cc1 { eval, pk, data }
    }

    /// 1-of-2 crypto-condition vout.
    pub fn cc_1of2(eval: u8, pk1: PubKey, pk2: PubKey, data: Option<Vec<u8>>) -> Self {
        ScriptPubKey::Cc1of2 {
            eval,
            pk1,
            pk2,
            data,
        }
    }

    /// OP_RETURN carrier for the given payload.
    pub fn op_return(data: Vec<u8>) -> Self {
        ScriptPubKey::OpReturn(data)
    }

    /// Whether this is a crypto-condition script.
    pub fn is_cc(&self) -> bool {
        matches!(
            self,
            ScriptPubKey::Cc1 { .. } | ScriptPubKey::Cc1of2 { .. }
        )
    }

    /// The embedded crypto-condition data blob, if any.
    pub fn cc_data(&self) -> Option<&[u8]> {
        match self {
            ScriptPubKey::Cc1 { data, .. } | ScriptPubKey::Cc1of2 { data, .. } => {
                data.as_deref()
            }
            _ => None,
        }
    }

    /// The OP_RETURN payload, if this is an OP_RETURN script.
    pub fn op_return_data(&self) -> Option<&[u8]> {
        match self {
            ScriptPubKey::OpReturn(data) => Some(data),
            _ => None,
        }
    }

    /// The pubkey paid by a normal P2PK template, if any.
    pub fn p2pk_pubkey(&self) -> Option<&PubKey> {
        match self {
            ScriptPubKey::P2pk(pk) => Some(pk),
            _ => None,
        }
    }

    /// Canonical byte encoding used for txid digests.
    pub(crate) fn write_digest_bytes(&self, out: &mut Vec<u8>) {
        match self {
            ScriptPubKey::P2pk(pk) => {
                out.push(0x01);
                out.extend_from_slice(pk.as_bytes());
            }
            ScriptPubKey::Cc1 { eval, pk, data } => {
                out.push(0x02);
                out.push(*eval);
                out.extend_from_slice(pk.as_bytes());
                write_opt_blob(out, data.as_deref());
            }
            ScriptPubKey::Cc1of2 {
                eval,
                pk1,
                pk2,
                data,
            } => {
                out.push(0x03);
                out.push(*eval);
                out.extend_from_slice(pk1.as_bytes());
                out.extend_from_slice(pk2.as_bytes());
                write_opt_blob(out, data.as_deref());
            }
            ScriptPubKey::OpReturn(data) => {
                out.push(0x04);
                write_opt_blob(out, Some(data));
            }
        }
    }
}

fn write_opt_blob(out: &mut Vec<u8>, blob: Option<&[u8]>) {
    match blob {
        Some(data) => {
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        None => out.extend_from_slice(&u32::MAX.to_le_bytes()),
    }
}

/// An input unlocking script, reduced to what consensus needs: whether the
/// spend is a crypto-condition spend and which key signed it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ScriptSig {
    /// Normal pay-to-pubkey spend signed by this key.
    Normal(PubKey),

    /// Crypto-condition spend under an eval code, signed by this key.
    Cc { eval: u8, signer: PubKey },
}

impl ScriptSig {
    /// Whether this input spends a crypto-condition output.
    pub fn is_cc(&self) -> bool {
        matches!(self, ScriptSig::Cc { .. })
    }

    /// Whether this input is a crypto-condition spend under the given eval code.
    pub fn is_cc_for(&self, eval_code: u8) -> bool {
        matches!(self, ScriptSig::Cc { eval, .. } if *eval == eval_code)
    }

    /// The key that signed this input.
    pub fn signer(&self) -> &PubKey {
        match self {
            ScriptSig::Normal(pk) => pk,
            ScriptSig::Cc { signer, .. } => signer,
        }
    }

    pub(crate) fn write_digest_bytes(&self, out: &mut Vec<u8>) {
        match self {
            ScriptSig::Normal(pk) => {
                out.push(0x01);
                out.extend_from_slice(pk.as_bytes());
            }
            ScriptSig::Cc { eval, signer } => {
                out.push(0x02);
                out.push(*eval);
                out.extend_from_slice(signer.as_bytes());
            }
        }
    }
}

/// Derive the address of a 1-of-2 crypto-condition output.
///
/// Stands in for the host's base58 crypto-condition address; consensus only
/// ever compares two of these for equality, so a hex rendering of a
/// Blake2b-256 digest over the condition's fixed parts is sufficient.
pub fn cc_1of2_address(eval: u8, pk1: &PubKey, pk2: &PubKey) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update([eval, 0x02]); // condition arity tag
    hasher.update(pk1.as_bytes());
    hasher.update(pk2.as_bytes());
    hex::encode(hasher.finalize())
}
