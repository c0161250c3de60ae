//! The opret codec.
//!
//! Every Marmara output carries an "opret": a typed metadata record either
//! embedded in the output's crypto-condition data blob or placed in the
//! transaction's trailing OP_RETURN vout. The wire layout is:
//!
//! ```text
//! +-----------+----------+----------+------------------------+
//! | eval 0xEF | func id  | version  | func-specific payload  |
//! | 1 byte    | 1 byte   | 1 byte   | little-endian fields   |
//! +-----------+----------+----------+------------------------+
//! ```
//!
//! Pubkeys are 33 bytes compressed, hashes 32 bytes, amounts `i64`, heights
//! `i32`, the currency tag a u8-length-prefixed string. Anything that does
//! not parse (unknown func id, unknown version, truncated payload) decodes
//! to `None`; the codec never panics on attacker-controlled bytes.

use crate::params::{MARMARA_EVAL, OPRET_LOOP12_VERSION, OPRET_VERSION};
use bytes::{Buf, BufMut};
use marmara_chain::{Amount, Height, PubKey, TxId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Function ids carried in byte 1 of every opret.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum FuncId {
    /// 'C': PoS coinbase locked as activated coins.
    Coinbase = b'C',
    /// 'E': coinbase variant with tripled reward weighting.
    Coinbase3x = b'E',
    /// 'A': activated coins.
    Activated = b'A',
    /// 'N': initially-activated coins.
    ActivatedInitial = b'N',
    /// 'P': staking pool share.
    Pool = b'P',
    /// 'B': credit loop creation.
    Create = b'B',
    /// 'R': request to receive an issue or transfer.
    Request = b'R',
    /// 'I': loop issuance.
    Issue = b'I',
    /// 'T': loop transfer to the next endorser.
    Transfer = b'T',
    /// 'K': coins locked in a credit loop.
    Locked = b'K',
    /// 'S': full settlement.
    Settle = b'S',
    /// 'D': partial settlement.
    SettlePartial = b'D',
    /// 'O': release of activated coins back to normal.
    Release = b'O',
    /// 'L': legacy loop payment marker.
    Loop = b'L',
}

impl FuncId {
    /// Parse a func-id byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            b'C' => FuncId::Coinbase,
            b'E' => FuncId::Coinbase3x,
            b'A' => FuncId::Activated,
            b'N' => FuncId::ActivatedInitial,
            b'P' => FuncId::Pool,
            b'B' => FuncId::Create,
            b'R' => FuncId::Request,
            b'I' => FuncId::Issue,
            b'T' => FuncId::Transfer,
            b'K' => FuncId::Locked,
            b'S' => FuncId::Settle,
            b'D' => FuncId::SettlePartial,
            b'O' => FuncId::Release,
            b'L' => FuncId::Loop,
            _ => return None,
        })
    }

    /// The wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this func id marks activated (stake-weighted) coins.
    pub fn is_activated(self) -> bool {
        matches!(
            self,
            FuncId::Coinbase
                | FuncId::Coinbase3x
                | FuncId::Activated
                | FuncId::ActivatedInitial
                | FuncId::Pool
        )
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// Which activated func id an activated opret carries.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ActivatedKind {
    Coinbase,
    Coinbase3x,
    Activated,
    ActivatedInitial,
    Pool,
}

impl ActivatedKind {
    /// The corresponding func id.
    pub fn func_id(self) -> FuncId {
        match self {
            ActivatedKind::Coinbase => FuncId::Coinbase,
            ActivatedKind::Coinbase3x => FuncId::Coinbase3x,
            ActivatedKind::Activated => FuncId::Activated,
            ActivatedKind::ActivatedInitial => FuncId::ActivatedInitial,
            ActivatedKind::Pool => FuncId::Pool,
        }
    }

    fn from_func_id(func: FuncId) -> Option<Self> {
        Some(match func {
            FuncId::Coinbase => ActivatedKind::Coinbase,
            FuncId::Coinbase3x => ActivatedKind::Coinbase3x,
            FuncId::Activated => ActivatedKind::Activated,
            FuncId::ActivatedInitial => ActivatedKind::ActivatedInitial,
            FuncId::Pool => ActivatedKind::Pool,
            _ => return None,
        })
    }
}

/// Optional issuer terms carried by an issue opret.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IssuerParams {
    /// Settle automatically at maturity.
    pub auto_settlement: bool,
    /// Insure the obligation automatically.
    pub auto_insurance: bool,
    /// Number of avalists backing the obligation.
    pub aval_count: i32,
    /// Height at which an open dispute expires.
    pub dispute_expires_height: Height,
    /// Whether an escrow backs the obligation.
    pub escrow_on: bool,
    /// Amount blocked in escrow.
    pub blockage_amount: Amount,
}

impl Default for IssuerParams {
    fn default() -> Self {
        Self {
            auto_settlement: true,
            auto_insurance: true,
            aval_count: 0,
            dispute_expires_height: 0,
            escrow_on: false,
            blockage_amount: 0,
        }
    }
}

/// A decoded opret, one variant per func id.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum MarmaraOpret {
    /// C/E/A/N/P: activated coins owned by `pk`.
    Activated {
        kind: ActivatedKind,
        pk: PubKey,
        height: Height,
        unlock_height: Height,
    },
    /// B: creation of a credit loop.
    Create {
        pk: PubKey,
        amount: Amount,
        matures: Height,
        currency: String,
    },
    /// R: request to receive an issue or transfer of the given loop.
    Request { create_txid: TxId, pk: PubKey },
    /// I: issuance of the loop to receiver `pk`.
    Issue {
        create_txid: TxId,
        pk: PubKey,
        params: IssuerParams,
    },
    /// T: transfer of the loop to receiver `pk`.
    Transfer {
        create_txid: TxId,
        pk: PubKey,
        aval_count: i32,
    },
    /// K: coins locked in the loop for endorser `pk`.
    Locked { create_txid: TxId, pk: PubKey },
    /// S: full settlement to holder `pk`; `remaining` is zero.
    Settle {
        create_txid: TxId,
        pk: PubKey,
        remaining: Amount,
    },
    /// D: partial settlement to holder `pk`; `remaining` stays owed.
    SettlePartial {
        create_txid: TxId,
        pk: PubKey,
        remaining: Amount,
    },
    /// O: activated coins released back to normal.
    Release,
    /// L: legacy loop payment marker.
    Loop,
}

/// How strictly [`MarmaraOpret::decode_with_version`] checks byte 2.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VersionCheck {
    /// Accept the current version only.
    Default,
    /// Accept any known version (current and the loop-12 variant).
    Any,
}

/// Which of the two carrying sites an opret was found at.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpretCarrier {
    /// Inside the output's crypto-condition data blob.
    CcData,
    /// In the transaction's trailing OP_RETURN vout.
    LastVout,
}

impl MarmaraOpret {
    /// The func id of this opret.
    pub fn func_id(&self) -> FuncId {
        match self {
            MarmaraOpret::Activated { kind, .. } => kind.func_id(),
            MarmaraOpret::Create { .. } => FuncId::Create,
            MarmaraOpret::Request { .. } => FuncId::Request,
            MarmaraOpret::Issue { .. } => FuncId::Issue,
            MarmaraOpret::Transfer { .. } => FuncId::Transfer,
            MarmaraOpret::Locked { .. } => FuncId::Locked,
            MarmaraOpret::Settle { .. } => FuncId::Settle,
            MarmaraOpret::SettlePartial { .. } => FuncId::SettlePartial,
            MarmaraOpret::Release => FuncId::Release,
            MarmaraOpret::Loop => FuncId::Loop,
        }
    }

    /// The embedded pubkey, where the payload carries one.
    pub fn pubkey(&self) -> Option<&PubKey> {
        match self {
            MarmaraOpret::Activated { pk, .. }
            | MarmaraOpret::Create { pk, .. }
            | MarmaraOpret::Request { pk, .. }
            | MarmaraOpret::Issue { pk, .. }
            | MarmaraOpret::Transfer { pk, .. }
            | MarmaraOpret::Locked { pk, .. }
            | MarmaraOpret::Settle { pk, .. }
            | MarmaraOpret::SettlePartial { pk, .. } => Some(pk),
            MarmaraOpret::Release | MarmaraOpret::Loop => None,
        }
    }

    /// The embedded creation txid, where the payload carries one.
    pub fn create_txid(&self) -> Option<&TxId> {
        match self {
            MarmaraOpret::Request { create_txid, .. }
            | MarmaraOpret::Issue { create_txid, .. }
            | MarmaraOpret::Transfer { create_txid, .. }
            | MarmaraOpret::Locked { create_txid, .. }
            | MarmaraOpret::Settle { create_txid, .. }
            | MarmaraOpret::SettlePartial { create_txid, .. } => Some(create_txid),
            _ => None,
        }
    }

    /// Serialise to wire bytes at the current opret version.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(96);
        buf.put_u8(MARMARA_EVAL);
        buf.put_u8(self.func_id().as_byte());
        buf.put_u8(OPRET_VERSION);
        match self {
            MarmaraOpret::Activated {
                pk,
                height,
                unlock_height,
                ..
            } => {
                buf.put_slice(pk.as_bytes());
                buf.put_i32_le(*height);
                buf.put_i32_le(*unlock_height);
            }
            MarmaraOpret::Create {
                pk,
                amount,
                matures,
                currency,
            } => {
                buf.put_slice(pk.as_bytes());
                buf.put_i64_le(*amount);
                buf.put_i32_le(*matures);
                buf.put_u8(currency.len().min(u8::MAX as usize) as u8);
                buf.put_slice(&currency.as_bytes()[..currency.len().min(u8::MAX as usize)]);
            }
            MarmaraOpret::Request { create_txid, pk } | MarmaraOpret::Locked { create_txid, pk } => {
                buf.put_slice(create_txid.as_bytes());
                buf.put_slice(pk.as_bytes());
            }
            MarmaraOpret::Issue {
                create_txid,
                pk,
                params,
            } => {
                buf.put_slice(create_txid.as_bytes());
                buf.put_slice(pk.as_bytes());
                buf.put_u8(params.auto_settlement as u8);
                buf.put_u8(params.auto_insurance as u8);
                buf.put_i32_le(params.aval_count);
                buf.put_i32_le(params.dispute_expires_height);
                buf.put_u8(params.escrow_on as u8);
                buf.put_i64_le(params.blockage_amount);
            }
            MarmaraOpret::Transfer {
                create_txid,
                pk,
                aval_count,
            } => {
                buf.put_slice(create_txid.as_bytes());
                buf.put_slice(pk.as_bytes());
                buf.put_i32_le(*aval_count);
            }
            MarmaraOpret::Settle {
                create_txid,
                pk,
                remaining,
            }
            | MarmaraOpret::SettlePartial {
                create_txid,
                pk,
                remaining,
            } => {
                buf.put_slice(create_txid.as_bytes());
                buf.put_slice(pk.as_bytes());
                buf.put_i64_le(*remaining);
            }
            MarmaraOpret::Release | MarmaraOpret::Loop => {}
        }
        buf
    }

    /// Parse wire bytes at the current opret version.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        Self::decode_with_version(bytes, VersionCheck::Default)
    }

    /// Parse wire bytes, selecting how strictly the version byte is checked.
    pub fn decode_with_version(bytes: &[u8], check: VersionCheck) -> Option<Self> {
        if bytes.len() < 3 {
            debug!(len = bytes.len(), "opret too short");
            return None;
        }
        if bytes[0] != MARMARA_EVAL {
            debug!(eval = bytes[0], "not a marmara opret");
            return None;
        }
        let func = FuncId::from_byte(bytes[1])?;
        let version = bytes[2];
        let version_ok = match check {
            VersionCheck::Default => version == OPRET_VERSION,
            VersionCheck::Any => version == OPRET_VERSION || version == OPRET_LOOP12_VERSION,
        };
        if !version_ok {
            debug!(%func, version, "unsupported opret version");
            return None;
        }

        let mut payload = &bytes[3..];
        let opret = match func {
            FuncId::Coinbase
            | FuncId::Coinbase3x
            | FuncId::Activated
            | FuncId::ActivatedInitial
            | FuncId::Pool => MarmaraOpret::Activated {
                kind: ActivatedKind::from_func_id(func)?,
                pk: get_pubkey(&mut payload)?,
                height: get_i32(&mut payload)?,
                unlock_height: get_i32(&mut payload)?,
            },
            FuncId::Create => MarmaraOpret::Create {
                pk: get_pubkey(&mut payload)?,
                amount: get_i64(&mut payload)?,
                matures: get_i32(&mut payload)?,
                currency: get_short_string(&mut payload)?,
            },
            FuncId::Request => MarmaraOpret::Request {
                create_txid: get_txid(&mut payload)?,
                pk: get_pubkey(&mut payload)?,
            },
            FuncId::Issue => MarmaraOpret::Issue {
                create_txid: get_txid(&mut payload)?,
                pk: get_pubkey(&mut payload)?,
                params: IssuerParams {
                    auto_settlement: get_u8(&mut payload)? != 0,
                    auto_insurance: get_u8(&mut payload)? != 0,
                    aval_count: get_i32(&mut payload)?,
                    dispute_expires_height: get_i32(&mut payload)?,
                    escrow_on: get_u8(&mut payload)? != 0,
                    blockage_amount: get_i64(&mut payload)?,
                },
            },
            FuncId::Transfer => MarmaraOpret::Transfer {
                create_txid: get_txid(&mut payload)?,
                pk: get_pubkey(&mut payload)?,
                aval_count: get_i32(&mut payload)?,
            },
            FuncId::Locked => MarmaraOpret::Locked {
                create_txid: get_txid(&mut payload)?,
                pk: get_pubkey(&mut payload)?,
            },
            FuncId::Settle => MarmaraOpret::Settle {
                create_txid: get_txid(&mut payload)?,
                pk: get_pubkey(&mut payload)?,
                remaining: get_i64(&mut payload)?,
            },
            FuncId::SettlePartial => MarmaraOpret::SettlePartial {
                create_txid: get_txid(&mut payload)?,
                pk: get_pubkey(&mut payload)?,
                remaining: get_i64(&mut payload)?,
            },
            FuncId::Release => MarmaraOpret::Release,
            FuncId::Loop => MarmaraOpret::Loop,
        };
        Some(opret)
    }
}

fn get_u8(buf: &mut &[u8]) -> Option<u8> {
    if buf.remaining() < 1 {
        return None;
    }
    Some(buf.get_u8())
}

fn get_i32(buf: &mut &[u8]) -> Option<i32> {
    if buf.remaining() < 4 {
        return None;
    }
    Some(buf.get_i32_le())
}

fn get_i64(buf: &mut &[u8]) -> Option<i64> {
    if buf.remaining() < 8 {
        return None;
    }
    Some(buf.get_i64_le())
}

fn get_pubkey(buf: &mut &[u8]) -> Option<PubKey> {
    if buf.remaining() < PubKey::LEN {
        return None;
    }
    let mut bytes = [0u8; PubKey::LEN];
    buf.copy_to_slice(&mut bytes);
    Some(PubKey(bytes))
}

fn get_txid(buf: &mut &[u8]) -> Option<TxId> {
    if buf.remaining() < TxId::LEN {
        return None;
    }
    let mut bytes = [0u8; TxId::LEN];
    buf.copy_to_slice(&mut bytes);
    Some(TxId(bytes))
}

fn get_short_string(buf: &mut &[u8]) -> Option<String> {
    let len = get_u8(buf)? as usize;
    if buf.remaining() < len {
        return None;
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).ok()
}
